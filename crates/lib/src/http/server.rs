//! Process lifecycle: open the session, serve, and shut down gracefully on SIGINT/SIGTERM.

use crate::config::Config;
use crate::discord::DiscordSession;
use crate::http::handler::router;
use crate::source::MessageSource;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Least time granted to closing the source, even when the drain used the whole budget.
/// Worst-case shutdown is therefore `drain_timeout + MIN_CLOSE_BUDGET`.
pub const MIN_CLOSE_BUDGET: Duration = Duration::from_secs(1);

/// What ended the Running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// The shutdown future completed (SIGINT/SIGTERM in production).
    Signal,
    /// The listener task exited on its own. axum 0.7's `serve` logs and retries accept
    /// errors, so in practice this means the server task panicked or returned early.
    /// No test drives this path.
    ListenerFailed,
}

/// Outcome of a completed shutdown. Failures are already logged; this is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub trigger: ShutdownTrigger,
    /// True when every in-flight request finished before the drain timeout.
    pub drained: bool,
    /// True when the remote session closed without error.
    pub source_closed: bool,
}

/// Open the Discord session, bind `server.bind:server.port`, and serve until SIGINT/SIGTERM.
/// Session and bind failures are returned as errors; shutdown problems are only logged.
pub async fn run(config: Config, token: String) -> Result<()> {
    let session = DiscordSession::open(&config.discord, &token)
        .await
        .context("failed to open discord session")?;
    let source: Arc<dyn MessageSource> = Arc::new(session);

    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            if let Err(close_err) = source.close().await {
                log::warn!("client shutdown error: {}", close_err);
            }
            return Err(e).with_context(|| format!("binding to {}", bind_addr));
        }
    };

    let report = serve(
        listener,
        source,
        shutdown_signal(),
        config.server.shutdown_timeout(),
    )
    .await;
    log::debug!("shutdown report: {:?}", report);
    Ok(())
}

/// Serve requests on `listener` until `shutdown` completes or the listener exits, then stop
/// accepting, wait up to `drain_timeout` for in-flight requests, and close `source`.
///
/// Closing gets what is left of `drain_timeout`, but never less than [`MIN_CLOSE_BUDGET`];
/// a close that overruns is abandoned and reported as not closed.
///
/// The source is closed only after the listener task has finished or been abandoned, so a
/// request that completes within the deadline always sees an open session.
pub async fn serve<F>(
    listener: TcpListener,
    source: Arc<dyn MessageSource>,
    shutdown: F,
    drain_timeout: Duration,
) -> ShutdownReport
where
    F: Future<Output = ()> + Send,
{
    match listener.local_addr() {
        Ok(addr) => log::info!("listening on {}", addr),
        Err(_) => log::info!("listening"),
    }

    let app = router(source.clone());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let trigger = tokio::select! {
        _ = shutdown => ShutdownTrigger::Signal,
        res = &mut server => {
            match res {
                Ok(Ok(())) => log::error!("server error: listener exited unexpectedly"),
                Ok(Err(e)) => log::error!("server error: {}", e),
                Err(e) => log::error!("server error: {}", e),
            }
            ShutdownTrigger::ListenerFailed
        }
    };

    log::info!("shutting down...");
    let shutdown_started = Instant::now();

    let drained = match trigger {
        ShutdownTrigger::ListenerFailed => true,
        ShutdownTrigger::Signal => {
            let _ = stop_tx.send(());
            match tokio::time::timeout(drain_timeout, &mut server).await {
                Ok(Ok(Ok(()))) => true,
                Ok(Ok(Err(e))) => {
                    log::warn!("shutdown error: {}", e);
                    true
                }
                Ok(Err(e)) => {
                    log::warn!("shutdown error: {}", e);
                    false
                }
                Err(_) => {
                    log::warn!(
                        "shutdown error: in-flight requests still running after {:?}; abandoning them",
                        drain_timeout
                    );
                    server.abort();
                    false
                }
            }
        }
    };

    log::info!("shutting down client...");
    let close_budget = drain_timeout
        .saturating_sub(shutdown_started.elapsed())
        .max(MIN_CLOSE_BUDGET);
    let source_closed = match tokio::time::timeout(close_budget, source.close()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::warn!("client shutdown error: {}", e);
            false
        }
        Err(_) => {
            log::warn!("client shutdown error: close did not finish within {:?}", close_budget);
            false
        }
    };

    log::info!("shutdown complete");
    ShutdownReport {
        trigger,
        drained,
        source_closed,
    }
}

/// Completes on SIGINT (Ctrl+C) or, on unix, SIGTERM.
/// A handler that fails to install is logged and never fires; the other still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
