// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Frame translation
//
// Maps each upstream frame to at most one semantic event. Translators are
// provider-specific; the relay ships one for OpenAI-compatible chat
// completion streams (DeepSeek, OpenAI and friends).

use super::types::{Frame, SemanticEvent};

// ---------------------------------------------------------------------------
// Trait: FrameTranslator
// ---------------------------------------------------------------------------

/// Decides what a frame means for the session.
///
/// Returns `None` for frames with nothing to forward: keep-alive comments,
/// frames without a `data:` line, and chunks with empty or absent content.
pub trait FrameTranslator: Send + Sync {
    fn translate(&self, frame: &Frame) -> Option<SemanticEvent>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible translator
// ---------------------------------------------------------------------------

/// End-of-stream sentinel used by OpenAI-compatible providers.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Translates OpenAI-style chat completion chunks.
///
/// - `data: {"choices":[{"delta":{"content":"Hel"}}]}` -> ContentDelta("Hel")
/// - `data: {"choices":[{"delta":{"role":"assistant"}}]}` -> nothing
/// - `data: [DONE]` -> StreamEnd
/// - `data: {not json` -> Unparseable
/// - `: keep-alive` -> nothing
pub struct OpenAiFrameTranslator;

impl FrameTranslator for OpenAiFrameTranslator {
    fn translate(&self, frame: &Frame) -> Option<SemanticEvent> {
        let payload = data_payload(frame)?;
        let payload = payload.trim();

        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            return Some(SemanticEvent::StreamEnd);
        }

        let json: serde_json::Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                return Some(SemanticEvent::Unparseable {
                    raw: payload.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())?;

        if content.is_empty() {
            return None;
        }
        Some(SemanticEvent::ContentDelta {
            text: content.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// SSE field parsing
// ---------------------------------------------------------------------------

/// Extract the data payload of a frame.
///
/// Multiple `data:` lines are joined with `\n`. One space after the colon is
/// stripped. Other fields (`event:`, `id:`, `retry:`) and `:` comments are
/// ignored. Returns `None` when the frame has no `data:` line at all.
pub fn data_payload(frame: &Frame) -> Option<String> {
    let mut payload: Option<String> = None;

    for line in frame.text().split(['\r', '\n']) {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match payload.as_mut() {
            Some(p) => {
                p.push('\n');
                p.push_str(value);
            }
            None => payload = Some(value.to_string()),
        }
    }

    payload
}
