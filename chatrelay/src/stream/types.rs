// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Frames coming out of the reassembler, the semantic events they translate
// to, the messages written downstream, and the ways a session can end.

use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::json;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Upstream side
// ---------------------------------------------------------------------------

/// One blank-line delimited unit of the upstream event stream.
///
/// The text is everything before the delimiter, with its trailing line
/// terminator removed. It may span several lines (`event:`, `data:`, `id:`,
/// comments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    text: String,
}

impl Frame {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// An upstream frame grew past the reassembler's limit without a delimiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("frame exceeds {max} bytes without a delimiter ({buffered} buffered)")]
pub struct FrameTooLarge {
    pub buffered: usize,
    pub max: usize,
}

/// What a frame means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticEvent {
    /// A piece of generated text to forward to the client.
    ContentDelta { text: String },
    /// The provider's end-of-stream sentinel (`data: [DONE]`).
    StreamEnd,
    /// A data payload that is not valid JSON. Logged and skipped.
    Unparseable { raw: String, reason: String },
}

// ---------------------------------------------------------------------------
// Downstream side
// ---------------------------------------------------------------------------

/// A message in the client-facing event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownstreamMessage {
    /// `data: {"chunk": "..."}`
    Chunk(String),
    /// `data: {"done": true}`
    Done,
    /// `event: error` + `data: {"message": "..."}`
    Error { message: String },
}

impl DownstreamMessage {
    /// Render into server-sent-event wire format, including the trailing
    /// blank line.
    pub fn render(&self) -> Bytes {
        let text = match self {
            DownstreamMessage::Chunk(text) => {
                format!("data: {}\n\n", json!({ "chunk": text }))
            }
            DownstreamMessage::Done => format!("data: {}\n\n", json!({ "done": true })),
            DownstreamMessage::Error { message } => {
                format!("event: error\ndata: {}\n\n", json!({ "message": message }))
            }
        };
        Bytes::from(text)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownstreamMessage::Chunk(_))
    }
}

/// Why a write to the client was not performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// The session already wrote its terminal message.
    #[error("downstream already closed")]
    Closed,
    /// The client went away; the receiving half of the channel is gone.
    #[error("client disconnected")]
    Disconnected,
    /// The client stopped reading and the session deadline passed while
    /// waiting for room in the channel.
    #[error("session deadline passed while client was not reading")]
    Expired,
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the upstream response head.
    Idle,
    /// Upstream accepted; bytes are arriving.
    Streaming,
    /// Terminal. Nothing more is written.
    Closed,
}

/// Per-session time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Max wait for the upstream response head and between byte deliveries.
    pub idle_timeout: Duration,
    /// Deadline for the whole session, measured from its start.
    pub session_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            session_timeout: Duration::from_secs(600),
        }
    }
}

/// Failures that end a session after the stream has been opened.
///
/// `Display` carries the internal detail for logs; `client_message` is what
/// the client sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    #[error("upstream rejected request with {status}: {body}")]
    UpstreamRequest { status: StatusCode, body: String },

    #[error("upstream request failed: {0}")]
    UpstreamConnect(String),

    #[error("upstream stream failed: {0}")]
    UpstreamTransport(String),

    #[error("no upstream data for {0:?}")]
    UpstreamIdle(Duration),

    #[error("session exceeded {0:?}")]
    SessionExpired(Duration),
}

impl StreamFailure {
    pub fn client_message(&self) -> String {
        match self {
            StreamFailure::UpstreamRequest { status, .. } => format!(
                "API Error: {}",
                status.canonical_reason().unwrap_or(status.as_str())
            ),
            StreamFailure::UpstreamConnect(_) => {
                "Internal server error during streaming setup or processing".to_string()
            }
            StreamFailure::UpstreamTransport(_) => {
                "Error in response stream from upstream provider".to_string()
            }
            StreamFailure::UpstreamIdle(_) => "Upstream stopped responding".to_string(),
            StreamFailure::SessionExpired(_) => "Session time limit exceeded".to_string(),
        }
    }
}

/// How a session ended. Exactly one per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Upstream finished; `done` was sent.
    Completed,
    /// Upstream or a limit failed; `error` was sent.
    Failed(StreamFailure),
    /// The client disconnected; nothing further was sent.
    Cancelled,
}

impl Outcome {
    /// The terminal message this outcome produces, if any.
    pub fn terminal_message(&self) -> Option<DownstreamMessage> {
        match self {
            Outcome::Completed => Some(DownstreamMessage::Done),
            Outcome::Failed(failure) => Some(DownstreamMessage::Error {
                message: failure.client_message(),
            }),
            Outcome::Cancelled => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}
