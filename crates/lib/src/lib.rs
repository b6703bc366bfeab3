//! chanlog core library: configuration, the Discord session, and the HTTP service
//! that serves recent channel messages.

pub mod config;
pub mod discord;
pub mod http;
pub mod source;
