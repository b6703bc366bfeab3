//! HTTP surface: one `GET /` endpoint serving channel history, plus the process lifecycle
//! (serve until a signal, drain under a deadline, close the remote session).

mod handler;
mod server;

pub use handler::{router, ApiError, HttpState};
pub use server::{run, serve, shutdown_signal, ShutdownReport, ShutdownTrigger, MIN_CLOSE_BUDGET};
