//! `GET /?channelId=..&limit=..` handler and its JSON error responses.

use crate::source::MessageSource;
use axum::{
    extract::{RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::sync::Arc;

/// Shared state for request handlers: the open remote session.
#[derive(Clone)]
pub struct HttpState {
    pub source: Arc<dyn MessageSource>,
}

/// Request-scoped failures. The Display text is the `error` field sent to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing query param: channelId")]
    MissingChannelId,
    #[error("missing or malformed query param: limit")]
    MalformedLimit,
    /// Remote or serialization failure; the cause is logged, never returned.
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingChannelId | ApiError::MalformedLimit => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(source: Arc<dyn MessageSource>) -> Router {
    Router::new()
        .route("/", get(channel_messages))
        .with_state(HttpState { source })
}

/// True when every `%` starts a two-digit hex escape.
fn has_valid_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !ok {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Decode one form-encoded component (`+` is a space). None on a bad escape or non-UTF-8 bytes.
fn decode_component(raw: &str) -> Option<String> {
    if !has_valid_escapes(raw) {
        return None;
    }
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Split a raw query string into decoded pairs in request order.
/// Pairs containing `;` or an undecodable key or value are dropped; the rest are kept.
fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.contains(';'))
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Some((decode_component(k)?, decode_component(v)?))
        })
        .collect()
}

/// First value for `key`, like a form lookup: later repeats are ignored.
fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// `limit` must be a base-10 integer >= 1. Zero and negatives never reach the remote;
/// values past `u32::MAX` are clamped, since the remote caps the page size anyway.
fn parse_limit(raw: Option<&str>) -> Result<u32, ApiError> {
    let n = raw
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .ok_or(ApiError::MalformedLimit)?;
    Ok(u32::try_from(n).unwrap_or(u32::MAX))
}

/// GET /: validates channelId and limit, then makes exactly one fetch through the session.
async fn channel_messages(
    State(state): State<HttpState>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let params = query_pairs(raw.as_deref());

    let channel_id = first(&params, "channelId")
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingChannelId)?;
    let limit = parse_limit(first(&params, "limit"))?;

    log::debug!("fetching up to {} message(s) from channel {}", limit, channel_id);
    let messages = state
        .source
        .fetch_messages(channel_id, limit)
        .await
        .map_err(|e| {
            log::error!("error while getting channel messages: {}", e);
            ApiError::Internal
        })?;

    let body = serde_json::to_vec(&messages).map_err(|e| {
        log::error!("error while marshalling json: {}", e);
        ApiError::Internal
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
