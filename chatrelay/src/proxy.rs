// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - POST /chat: check the credential, validate the body, open a session
// - Stream the session's output as server-sent events
// - Health endpoint
// - CORS policy
// - 404 for unknown paths, 405 for wrong methods (router defaults)

use crate::cache::CompletionCache;
use crate::stream::{
    DownstreamEmitter, FrameTranslator, OpenAiFrameTranslator, Session, SessionLimits,
    EMIT_BUFFER,
};
use crate::upstream::UpstreamClient;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a request body was refused.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("prompt is missing, empty or not a string")]
    MissingPrompt,
}

impl ValidationError {
    fn public_message(&self) -> &'static str {
        match self {
            ValidationError::EmptyBody => "request body is empty",
            ValidationError::MalformedJson(_) => "request body is not valid JSON",
            ValidationError::MissingPrompt => "Prompt is required",
        }
    }
}

/// Errors that stop a request before any stream is opened.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("upstream API key not configured")]
    Configuration,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, public_message) = match &self {
            RequestError::Configuration => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Upstream API key not configured",
            ),
            RequestError::Validation(e) => (StatusCode::BAD_REQUEST, e.public_message()),
        };
        (status, Json(serde_json::json!({ "error": public_message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no credential is configured; every chat request then
    /// fails with `RequestError::Configuration`.
    pub upstream: Option<Arc<dyn UpstreamClient>>,
    pub cache: Arc<dyn CompletionCache>,
    pub translator: Arc<dyn FrameTranslator>,
    pub limits: SessionLimits,
}

impl AppState {
    pub fn new(
        upstream: Option<Arc<dyn UpstreamClient>>,
        cache: Arc<dyn CompletionCache>,
        limits: SessionLimits,
    ) -> Self {
        Self {
            upstream,
            cache,
            translator: Arc::new(OpenAiFrameTranslator),
            limits,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Health endpoint: GET /health -> 200 OK
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Chat handler: POST /chat
///
/// Pre-stream failures answer with a JSON error. Everything after that is
/// reported inside the event stream by the session.
pub async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, RequestError> {
    let Some(upstream) = state.upstream.clone() else {
        tracing::error!("chat request refused, upstream API key not configured");
        return Err(RequestError::Configuration);
    };

    let prompt = match extract_prompt(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::info!(error = %e, "chat request rejected");
            return Err(e.into());
        }
    };

    let (emitter, rx) = DownstreamEmitter::channel(EMIT_BUFFER);
    let session = Session::new(
        emitter,
        state.translator.clone(),
        state.cache.clone(),
        state.limits,
    );

    let span = tracing::info_span!("session", id = %session.id());
    span.in_scope(|| {
        tracing::info!(prompt_len = prompt.len(), "prompt received");
        tracing::debug!(%prompt, "prompt text");
    });
    tokio::spawn(session.run(upstream, prompt).instrument(span));

    Ok(event_stream_response(rx))
}

/// Pull `prompt` out of a JSON request body.
pub fn extract_prompt(body: &[u8]) -> Result<String, ValidationError> {
    if body.is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

    match value.get("prompt").and_then(|p| p.as_str()) {
        Some(prompt) if !prompt.is_empty() => Ok(prompt.to_string()),
        _ => Err(ValidationError::MissingPrompt),
    }
}

fn event_stream_response(rx: ReceiverStream<Bytes>) -> Response {
    let body = Body::from_stream(rx.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// CORS policy. An empty list allows any origin.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    cors.max_age(Duration::from_secs(3600))
}

/// Build the axum router with the chat and health routes.
///
/// The upstream client and cache come in through `state`; nothing here
/// opens connections.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;
    use crate::upstream::{UpstreamError, UpstreamReply};
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    // -----------------------------------------------------------------------
    // Test helpers
    // -----------------------------------------------------------------------

    /// Upstream that replays a fixed body and counts how often it was opened.
    struct MockUpstreamClient {
        body: &'static str,
        opened: AtomicUsize,
    }

    impl MockUpstreamClient {
        fn new(body: &'static str) -> Self {
            Self {
                body,
                opened: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl UpstreamClient for MockUpstreamClient {
        async fn open(&self, _prompt: &str) -> Result<UpstreamReply, UpstreamError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let chunks = vec![Ok(Bytes::from_static(self.body.as_bytes()))];
            Ok(UpstreamReply::Streaming(Box::pin(tokio_stream::iter(chunks))))
        }
    }

    const TWO_CHUNKS: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n\
                              data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n\
                              data: [DONE]\n\n";

    fn app_with(upstream: Option<Arc<dyn UpstreamClient>>) -> Router {
        let state = AppState::new(upstream, Arc::new(NoopCache), SessionLimits::default());
        build_router(state, &[])
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    // -----------------------------------------------------------------------
    // Pre-stream errors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn missing_credential_returns_500() {
        let app = app_with(None);

        let resp = app.oneshot(chat_request(r#"{"prompt":"hi"}"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "error": "Upstream API key not configured" })
        );
    }

    #[tokio::test]
    async fn credential_checked_before_body() {
        let app = app_with(None);

        let resp = app.oneshot(chat_request("")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_or_empty_prompt_returns_400() {
        let upstream = Arc::new(MockUpstreamClient::new(TWO_CHUNKS));

        for body in [r#"{"prompt":""}"#, r#"{}"#, r#"{"prompt":42}"#, r#"["hi"]"#] {
            let app = app_with(Some(upstream.clone()));
            let resp = app.oneshot(chat_request(body)).await.unwrap();

            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(
                body_json(resp).await,
                serde_json::json!({ "error": "Prompt is required" })
            );
        }
        assert_eq!(upstream.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_json_returns_400() {
        let app = app_with(Some(Arc::new(MockUpstreamClient::new(TWO_CHUNKS))));

        let resp = app.oneshot(chat_request("this is not json {{{")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "error": "request body is not valid JSON" })
        );
    }

    #[tokio::test]
    async fn empty_body_returns_400() {
        let app = app_with(Some(Arc::new(MockUpstreamClient::new(TWO_CHUNKS))));

        let resp = app.oneshot(chat_request("")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "error": "request body is empty" })
        );
    }

    #[test]
    fn extract_prompt_keeps_text_verbatim() {
        assert_eq!(
            extract_prompt(br#"{"prompt":"  two words ","model":"ignored"}"#).unwrap(),
            "  two words "
        );
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn chat_streams_chunks_then_done() {
        let app = app_with(Some(Arc::new(MockUpstreamClient::new(TWO_CHUNKS))));

        let resp = app.oneshot(chat_request(r#"{"prompt":"hi"}"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers.get("content-type").unwrap(), "text/event-stream");
        assert_eq!(headers.get("cache-control").unwrap(), "no-cache");
        assert_eq!(headers.get("connection").unwrap(), "keep-alive");
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");

        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&body),
            "data: {\"chunk\":\"He\"}\n\ndata: {\"chunk\":\"llo\"}\n\ndata: {\"done\":true}\n\n"
        );
    }

    #[tokio::test]
    async fn concurrent_sessions_are_independent() {
        let upstream = Arc::new(MockUpstreamClient::new(TWO_CHUNKS));
        let num_requests = 10;
        let mut handles = Vec::new();

        for i in 0..num_requests {
            let app = app_with(Some(upstream.clone()));
            handles.push(tokio::spawn(async move {
                let req = chat_request(&format!(r#"{{"prompt":"request {i}"}}"#));
                let resp = app.oneshot(req).await.unwrap();
                axum::body::to_bytes(resp.into_body(), 1024 * 1024)
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            let body = handle.await.unwrap();
            assert!(body.ends_with(b"data: {\"done\":true}\n\n"));
        }
        assert_eq!(upstream.opened.load(Ordering::SeqCst), num_requests);
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_returns_200() {
        let app = app_with(None);

        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let app = app_with(None);

        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_returns_405() {
        let app = app_with(None);

        let req = Request::builder()
            .method("GET")
            .uri("/chat")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    // -----------------------------------------------------------------------
    // CORS
    // -----------------------------------------------------------------------

    fn health_from(origin: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri("/health")
            .header("origin", origin)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn cors_allows_any_origin_by_default() {
        let app = app_with(None);

        let resp = app.oneshot(health_from("https://anywhere.example")).await.unwrap();

        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn cors_restricts_to_configured_origins() {
        let origins = vec!["https://app.example".to_string()];
        let state = AppState::new(None, Arc::new(NoopCache), SessionLimits::default());

        let allowed = build_router(state.clone(), &origins)
            .oneshot(health_from("https://app.example"))
            .await
            .unwrap();
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").unwrap(),
            "https://app.example"
        );

        let denied = build_router(state, &origins)
            .oneshot(health_from("https://other.example"))
            .await
            .unwrap();
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn request_error_statuses() {
        assert_eq!(
            RequestError::Configuration.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RequestError::from(ValidationError::MissingPrompt)
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
