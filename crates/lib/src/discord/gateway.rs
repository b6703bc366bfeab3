//! Gateway WebSocket session: Hello, Identify, READY, then heartbeats until closed.
//!
//! There is no reconnect or resume. If Discord drops the session or asks for a
//! reconnect, the keep-alive task ends and the loss is reported on `close`.

use crate::discord::protocol::{
    GatewayPayload, HelloData, ReadyEvent, User, OP_HEARTBEAT, OP_HEARTBEAT_ACK, OP_HELLO,
    OP_INVALID_SESSION, OP_RECONNECT,
};
use crate::source::SourceError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use std::borrow::Cow;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const GATEWAY_VERSION: &str = "10";

/// Upper bound on connect + Hello + Identify + READY.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on waiting for the keep-alive task after the close frame is sent.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, WsMessage>;
type WsRead = SplitStream<WsStream>;

/// An identified gateway connection kept alive by a background task.
pub struct GatewaySession {
    user: User,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<Result<(), SourceError>>>>,
}

impl GatewaySession {
    /// Connect to `gateway_url`, identify with `token` and `intents`, and wait for READY.
    pub async fn connect(gateway_url: &str, token: &str, intents: u64) -> Result<Self, SourceError> {
        let mut url = Url::parse(gateway_url)
            .map_err(|e| SourceError::Url(format!("{}: {}", gateway_url, e)))?;
        url.query_pairs_mut()
            .append_pair("v", GATEWAY_VERSION)
            .append_pair("encoding", "json");

        let (write, read, interval_ms, seq, user) =
            tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(url.as_str(), token, intents))
                .await
                .map_err(|_| SourceError::Gateway("timed out waiting for READY".to_string()))??;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(keep_alive(write, read, interval_ms, seq, stop_rx));
        Ok(Self {
            user,
            stop_tx: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    /// The bot user reported in READY.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Send a normal close frame and wait for the keep-alive task. Later calls return Ok.
    pub async fn close(&self) -> Result<(), SourceError> {
        let stop_tx = self.stop_tx.lock().ok().and_then(|mut g| g.take());
        let task = self.task.lock().ok().and_then(|mut g| g.take());
        let Some(task) = task else {
            return Ok(());
        };
        if let Some(tx) = stop_tx {
            // Receiver is gone when the task already ended on its own; its result says why.
            let _ = tx.send(());
        }
        match tokio::time::timeout(CLOSE_TIMEOUT, task).await {
            Ok(Ok(res)) => res,
            Ok(Err(e)) => Err(SourceError::Gateway(format!("keep-alive task failed: {}", e))),
            Err(_) => Err(SourceError::Gateway("timed out closing gateway connection".to_string())),
        }
    }
}

async fn handshake(
    url: &str,
    token: &str,
    intents: u64,
) -> Result<(WsWrite, WsRead, u64, Option<u64>, User), SourceError> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = ws.split();

    let hello = next_payload(&mut read).await?;
    if hello.op != OP_HELLO {
        return Err(SourceError::Gateway(format!("expected Hello, got op {}", hello.op)));
    }
    let hello: HelloData = serde_json::from_value(hello.d.unwrap_or_default())?;
    log::debug!("gateway hello: heartbeat every {} ms", hello.heartbeat_interval);

    send_payload(&mut write, &GatewayPayload::identify(token, intents)).await?;

    let mut seq = None;
    loop {
        let payload = next_payload(&mut read).await?;
        if payload.s.is_some() {
            seq = payload.s;
        }
        if payload.is_dispatch("READY") {
            let ready: ReadyEvent = serde_json::from_value(payload.d.unwrap_or_default())?;
            log::debug!(
                "gateway ready: user {} session {}",
                ready.user.id,
                ready.session_id.as_deref().unwrap_or("-")
            );
            return Ok((write, read, hello.heartbeat_interval, seq, ready.user));
        }
        if payload.op == OP_INVALID_SESSION {
            return Err(SourceError::Gateway("session invalidated during identify".to_string()));
        }
    }
}

/// Next text frame as a payload. Close frames and end of stream are errors.
async fn next_payload(read: &mut WsRead) -> Result<GatewayPayload, SourceError> {
    while let Some(msg) = read.next().await {
        match msg? {
            WsMessage::Text(text) => return Ok(serde_json::from_str(&text)?),
            WsMessage::Close(frame) => {
                let detail = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(SourceError::Gateway(format!("closed by remote: {}", detail.trim())));
            }
            _ => {}
        }
    }
    Err(SourceError::Gateway("connection ended".to_string()))
}

async fn send_payload(write: &mut WsWrite, payload: &GatewayPayload) -> Result<(), SourceError> {
    let text = serde_json::to_string(payload)?;
    write.send(WsMessage::Text(text)).await?;
    Ok(())
}

async fn keep_alive(
    mut write: WsWrite,
    mut read: WsRead,
    interval_ms: u64,
    mut seq: Option<u64>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<(), SourceError> {
    let mut heartbeat = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    // First tick is immediate.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: Cow::Borrowed(""),
                };
                write.send(WsMessage::Close(Some(frame))).await?;
                log::debug!("gateway close frame sent");
                return Ok(());
            }
            _ = heartbeat.tick() => {
                send_payload(&mut write, &GatewayPayload::heartbeat(seq)).await?;
                log::debug!("gateway heartbeat sent (seq {:?})", seq);
            }
            msg = read.next() => {
                let payload = match msg {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<GatewayPayload>(&text) {
                        Ok(p) => p,
                        Err(e) => {
                            log::debug!("gateway: ignoring unparsable frame: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let detail = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                            .unwrap_or_default();
                        log::warn!("gateway connection closed by remote: {}", detail.trim());
                        return Err(SourceError::Gateway(format!("closed by remote: {}", detail.trim())));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        log::warn!("gateway connection lost: {}", e);
                        return Err(e.into());
                    }
                    None => {
                        log::warn!("gateway connection ended");
                        return Err(SourceError::Gateway("connection ended".to_string()));
                    }
                };
                if payload.s.is_some() {
                    seq = payload.s;
                }
                match payload.op {
                    OP_HEARTBEAT => {
                        send_payload(&mut write, &GatewayPayload::heartbeat(seq)).await?;
                    }
                    OP_HEARTBEAT_ACK => log::debug!("gateway heartbeat acknowledged"),
                    OP_RECONNECT | OP_INVALID_SESSION => {
                        log::warn!("gateway asked to reconnect (op {}); session not resumed", payload.op);
                        return Err(SourceError::Gateway(format!("session ended by remote (op {})", payload.op)));
                    }
                    _ => {}
                }
            }
        }
    }
}
