// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Streaming relay pipeline
//
// Responsibilities:
// - Reassemble upstream bytes into complete event frames
// - Translate frames into content deltas and the end-of-stream sentinel
// - Forward each delta to the client as soon as it is decoded
// - Own the session lifecycle and write exactly one terminal message
// - Stop touching upstream once the client disconnects

mod emitter;
mod reassembler;
mod session;
mod translator;
mod types;

pub use emitter::{DownstreamEmitter, EMIT_BUFFER};
pub use reassembler::{FrameReassembler, MAX_FRAME_BYTES};
pub use session::{Session, SessionReport};
pub use translator::{data_payload, FrameTranslator, OpenAiFrameTranslator, DONE_SENTINEL};
pub use types::{
    DownstreamMessage, EmitError, Frame, FrameTooLarge, Outcome, Phase, SemanticEvent,
    SessionLimits, StreamFailure,
};
