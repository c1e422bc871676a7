// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Upstream client
//
// Issues the single outbound chat completion request and exposes the
// response as either a byte stream (2xx) or a rejection with the error body.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::TryStreamExt;
use reqwest::StatusCode;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// Raw response body of an accepted upstream request.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Result of opening the upstream request.
pub enum UpstreamReply {
    /// 2xx: the body will be read incrementally.
    Streaming(ByteStream),
    /// Any other status, with the body read as text.
    Rejected { status: StatusCode, body: String },
}

impl std::fmt::Debug for UpstreamReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamReply::Streaming(_) => f.write_str("Streaming(..)"),
            UpstreamReply::Rejected { status, body } => f
                .debug_struct("Rejected")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The request never produced a response head.
    #[error("upstream request failed: {0}")]
    Connect(String),
    /// The response body failed while being read.
    #[error("upstream stream failed: {0}")]
    Transport(String),
}

/// Abstraction over the HTTP client that talks to the completion provider.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn open(&self, prompt: &str) -> Result<UpstreamReply, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Request body
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

// ---------------------------------------------------------------------------
// Reqwest client
// ---------------------------------------------------------------------------

/// Talks to an OpenAI-compatible chat completions endpoint over HTTP.
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpUpstreamClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;
        Ok(Self::with_client(client, endpoint, api_key, model))
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn open(&self, prompt: &str) -> Result<UpstreamReply, UpstreamError> {
        let body = CompletionBody {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(text) => text,
                Err(e) => format!("<unreadable error body: {e}>"),
            };
            return Ok(UpstreamReply::Rejected { status, body });
        }

        let stream = resp
            .bytes_stream()
            .map_err(|e| UpstreamError::Transport(e.to_string()));
        Ok(UpstreamReply::Streaming(Box::pin(stream)))
    }
}
