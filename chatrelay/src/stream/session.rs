// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Session lifecycle
//
// One `Session` per chat request. It owns the reassembler, the emitter and
// the phase, and is the only thing that touches them, so there is no way
// for a late upstream byte to race a close. The loop pulls from upstream
// and from the client's disconnect signal; whichever ends the session goes
// through `close`, which runs once.

use super::emitter::DownstreamEmitter;
use super::reassembler::FrameReassembler;
use super::translator::FrameTranslator;
use super::types::{
    DownstreamMessage, EmitError, Frame, Outcome, Phase, SemanticEvent, SessionLimits,
    StreamFailure,
};
use crate::cache::CompletionCache;
use crate::upstream::{ByteStream, UpstreamClient, UpstreamError, UpstreamReply};
use bytes::Bytes;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::time::{self, Instant};
use tokio_stream::StreamExt;
use uuid::Uuid;

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: Uuid,
    pub outcome: Outcome,
    /// Content chunks written to the client.
    pub chunks: usize,
}

/// What woke the session up.
enum Step<T> {
    Disconnected,
    Expired,
    Idle,
    Ready(T),
}

pub struct Session {
    id: Uuid,
    phase: Phase,
    reassembler: FrameReassembler,
    translator: Arc<dyn FrameTranslator>,
    emitter: DownstreamEmitter,
    cache: Arc<dyn CompletionCache>,
    limits: SessionLimits,
    /// End of the session; bounds upstream reads and client writes alike.
    deadline: Instant,
    /// Full reply text, collected only when the cache wants it.
    transcript: Option<String>,
    chunks: usize,
}

impl Session {
    pub fn new(
        emitter: DownstreamEmitter,
        translator: Arc<dyn FrameTranslator>,
        cache: Arc<dyn CompletionCache>,
        limits: SessionLimits,
    ) -> Self {
        let transcript = cache.is_enabled().then(String::new);
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Idle,
            reassembler: FrameReassembler::new(),
            translator,
            emitter,
            cache,
            limits,
            deadline: Instant::now() + limits.session_timeout,
            transcript,
            chunks: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the session to completion.
    ///
    /// Always ends in `Phase::Closed` with exactly one outcome. The session
    /// deadline counts from `new`.
    pub async fn run(mut self, upstream: Arc<dyn UpstreamClient>, prompt: String) -> SessionReport {
        let outcome = match self.wait(upstream.open(&prompt)).await {
            Step::Disconnected => Outcome::Cancelled,
            Step::Expired => Outcome::Failed(StreamFailure::SessionExpired(
                self.limits.session_timeout,
            )),
            Step::Idle => Outcome::Failed(StreamFailure::UpstreamIdle(self.limits.idle_timeout)),
            Step::Ready(Err(UpstreamError::Connect(e))) => {
                Outcome::Failed(StreamFailure::UpstreamConnect(e))
            }
            Step::Ready(Err(UpstreamError::Transport(e))) => {
                Outcome::Failed(StreamFailure::UpstreamTransport(e))
            }
            Step::Ready(Ok(UpstreamReply::Rejected { status, body })) => {
                Outcome::Failed(StreamFailure::UpstreamRequest { status, body })
            }
            Step::Ready(Ok(UpstreamReply::Streaming(stream))) => {
                tracing::info!("upstream accepted, streaming");
                self.phase = Phase::Streaming;
                self.pump(stream).await
            }
        };

        self.close(&outcome).await;
        if outcome == Outcome::Completed {
            self.record(&prompt).await;
        }

        SessionReport {
            id: self.id,
            outcome,
            chunks: self.chunks,
        }
    }

    /// Read upstream until it ends, fails, or the client leaves.
    async fn pump(&mut self, mut stream: ByteStream) -> Outcome {
        loop {
            let step = self.wait(stream.next()).await;
            let chunk = match step {
                Step::Disconnected => return Outcome::Cancelled,
                Step::Expired => {
                    return Outcome::Failed(StreamFailure::SessionExpired(
                        self.limits.session_timeout,
                    ))
                }
                Step::Idle => {
                    return Outcome::Failed(StreamFailure::UpstreamIdle(self.limits.idle_timeout))
                }
                Step::Ready(None) => {
                    if let Some(frame) = self.reassembler.finish() {
                        if let ControlFlow::Break(outcome) = self.dispatch(frame).await {
                            return outcome;
                        }
                    }
                    return Outcome::Completed;
                }
                Step::Ready(Some(Err(e))) => {
                    return Outcome::Failed(StreamFailure::UpstreamTransport(e.to_string()));
                }
                Step::Ready(Some(Ok(chunk))) => chunk,
            };

            if let ControlFlow::Break(outcome) = self.feed(&chunk).await {
                return outcome;
            }
        }
    }

    /// Push one delivery through the reassembler and dispatch its frames in
    /// order.
    async fn feed(&mut self, chunk: &Bytes) -> ControlFlow<Outcome> {
        tracing::trace!(raw = %String::from_utf8_lossy(chunk), "upstream chunk");
        let frames = match self.reassembler.push(chunk) {
            Ok(frames) => frames,
            Err(e) => {
                return ControlFlow::Break(Outcome::Failed(StreamFailure::UpstreamTransport(
                    e.to_string(),
                )))
            }
        };
        for frame in frames {
            self.dispatch(frame).await?;
        }
        ControlFlow::Continue(())
    }

    async fn dispatch(&mut self, frame: Frame) -> ControlFlow<Outcome> {
        match self.translator.translate(&frame) {
            None => ControlFlow::Continue(()),
            Some(SemanticEvent::StreamEnd) => {
                tracing::debug!("upstream end sentinel received");
                ControlFlow::Break(Outcome::Completed)
            }
            Some(SemanticEvent::Unparseable { raw, reason }) => {
                tracing::warn!(%raw, %reason, "skipping unparseable frame");
                ControlFlow::Continue(())
            }
            Some(SemanticEvent::ContentDelta { text }) => {
                if let Some(transcript) = self.transcript.as_mut() {
                    transcript.push_str(&text);
                }
                let message = DownstreamMessage::Chunk(text);
                match self.emitter.emit(&message, self.deadline).await {
                    Ok(()) => {
                        self.chunks += 1;
                        ControlFlow::Continue(())
                    }
                    Err(EmitError::Expired) => ControlFlow::Break(Outcome::Failed(
                        StreamFailure::SessionExpired(self.limits.session_timeout),
                    )),
                    Err(e) => {
                        tracing::debug!(error = %e, "stopping, chunk not delivered");
                        ControlFlow::Break(Outcome::Cancelled)
                    }
                }
            }
        }
    }

    /// Wait for `fut`, bounded by the idle timeout and the session deadline,
    /// while watching for the client to disconnect.
    async fn wait<F: std::future::Future>(&self, fut: F) -> Step<F::Output> {
        tokio::select! {
            biased;
            () = self.emitter.disconnected() => Step::Disconnected,
            () = time::sleep_until(self.deadline) => Step::Expired,
            res = time::timeout(self.limits.idle_timeout, fut) => match res {
                Ok(out) => Step::Ready(out),
                Err(_) => Step::Idle,
            },
        }
    }

    /// Move to `Closed`, writing the terminal message for `outcome`.
    ///
    /// Only the first call has any effect. Returns whether this call closed
    /// the session.
    pub(crate) async fn close(&mut self, outcome: &Outcome) -> bool {
        if self.phase == Phase::Closed {
            tracing::debug!(outcome = outcome.label(), "close on closed session ignored");
            return false;
        }
        self.phase = Phase::Closed;

        match outcome {
            Outcome::Completed => {}
            Outcome::Failed(failure) => {
                self.reassembler.discard();
                tracing::error!(error = %failure, "session failed");
            }
            Outcome::Cancelled => {
                let dropped = self.reassembler.discard();
                tracing::info!(dropped_bytes = dropped, "client disconnected");
            }
        }

        self.emitter
            .finish(outcome.terminal_message(), self.deadline)
            .await;
        tracing::info!(
            outcome = outcome.label(),
            chunks = self.chunks,
            "session closed"
        );
        true
    }

    /// Write the finished reply to the side-channel cache. Best effort.
    async fn record(&mut self, prompt: &str) {
        let Some(transcript) = self.transcript.take() else {
            return;
        };
        if transcript.is_empty() {
            return;
        }
        if let Err(e) = self.cache.store(prompt, &transcript).await {
            tracing::warn!(error = %e, "failed to cache completion");
        }
    }
}
