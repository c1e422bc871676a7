// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Downstream emitter
//
// Writes rendered messages into the channel that backs the client's
// response body. Holding the sender is what "open" means: closing takes it
// out, so a write after close has nowhere to go and is refused.
//
// Every write waits for channel room at most until the caller's deadline.
// A client that keeps the connection open but stops reading cannot hold the
// session past it.

use super::types::{DownstreamMessage, EmitError};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_stream::wrappers::ReceiverStream;

/// Default number of rendered messages buffered between the session and
/// the HTTP body.
pub const EMIT_BUFFER: usize = 64;

pub struct DownstreamEmitter {
    tx: Option<mpsc::Sender<Bytes>>,
    written: usize,
}

impl DownstreamEmitter {
    /// Create an emitter and the body stream it feeds.
    pub fn channel(capacity: usize) -> (Self, ReceiverStream<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Some(tx),
                written: 0,
            },
            ReceiverStream::new(rx),
        )
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Number of messages written so far, terminal included.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Write one message, waiting for channel room until `deadline`.
    ///
    /// Fails with `Closed` after `finish`, with `Disconnected` when the
    /// client has gone away, and with `Expired` when the client is not
    /// reading and `deadline` passes. None of these is a panic: the caller
    /// decides.
    pub async fn emit(
        &mut self,
        message: &DownstreamMessage,
        deadline: Instant,
    ) -> Result<(), EmitError> {
        let Some(tx) = self.tx.as_ref() else {
            tracing::debug!(?message, "write after close suppressed");
            return Err(EmitError::Closed);
        };
        let bytes = message.render();
        tracing::trace!(frame = %String::from_utf8_lossy(&bytes), "writing to client");
        match time::timeout_at(deadline, tx.send(bytes)).await {
            Ok(Ok(())) => {
                self.written += 1;
                Ok(())
            }
            Ok(Err(_)) => {
                self.tx = None;
                Err(EmitError::Disconnected)
            }
            Err(_) => Err(EmitError::Expired),
        }
    }

    /// Close the stream, writing `terminal` first if given.
    ///
    /// The terminal write waits for channel room only until `deadline`; past
    /// it, the write is attempted once without waiting. The transition
    /// happens once. Returns `false` if the emitter was already closed, in
    /// which case nothing is written.
    pub async fn finish(&mut self, terminal: Option<DownstreamMessage>, deadline: Instant) -> bool {
        let Some(tx) = self.tx.take() else {
            return false;
        };
        if let Some(message) = terminal {
            match time::timeout_at(deadline, tx.send(message.render())).await {
                Ok(Ok(())) => self.written += 1,
                Ok(Err(_)) => tracing::debug!("client gone before terminal message"),
                Err(_) => tracing::debug!("client not reading, terminal message dropped"),
            }
        }
        // Dropping the sender ends the response body.
        drop(tx);
        true
    }

    /// Resolves once the client has disconnected. Never resolves after
    /// `finish`.
    pub async fn disconnected(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}
