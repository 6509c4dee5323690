//! Wire frames for the line-delimited JSON protocol.
//!
//! Outgoing: `{"seq", "type":"request", "command", "arguments"}`.
//! Incoming: responses (`request_seq`, `success`, `body` | `message`) and
//! events (`event`, `body`). Anything else on stdout is not a frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// An outgoing request. Field order is the wire order.
#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: &'a str,
    pub arguments: &'a Value,
}

impl<'a> Request<'a> {
    pub fn new(seq: u64, command: &'a str, arguments: &'a Value) -> Self {
        Self {
            seq,
            kind: "request",
            command,
            arguments,
        }
    }
}

/// A response to one request, matched by `request_seq`.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub request_seq: u64,
    pub success: bool,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// An unsolicited event.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncomingFrame {
    Response(Response),
    Event(Event),
}

/// Decode one line of server output.
///
/// Returns `None` for lines that are not protocol frames (anything not
/// starting with `{`, such as `Content-Length` headers and blank lines).
pub fn decode_line(line: &[u8]) -> Option<Result<IncomingFrame, DecodeError>> {
    if line.first() != Some(&b'{') {
        return None;
    }
    Some(
        std::str::from_utf8(line)
            .map_err(DecodeError::from)
            .and_then(|text| serde_json::from_str(text).map_err(DecodeError::from)),
    )
}

// Event names the bridge reacts to. Everything else is ignored.
pub const EVENT_SYNTAX_DIAG: &str = "syntaxDiag";
pub const EVENT_SEMANTIC_DIAG: &str = "semanticDiag";
pub const EVENT_SUGGESTION_DIAG: &str = "suggestionDiag";
pub const EVENT_REQUEST_COMPLETED: &str = "requestCompleted";
pub const EVENT_PROJECT_LOADING_START: &str = "projectLoadingStart";
pub const EVENT_PROJECT_LOADING_FINISH: &str = "projectLoadingFinish";
