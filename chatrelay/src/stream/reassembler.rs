// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Frame reassembly
//
// Upstream bytes arrive in arbitrary chunks. A frame ends at a blank line,
// and any of `\n`, `\r\n` or `\r` ends a line. The terminator itself can be
// split across two deliveries, so the scan works on the accumulated buffer
// and never decides on a trailing `\r` until the next byte is known.

use super::types::{Frame, FrameTooLarge};
use bytes::BytesMut;

/// Largest number of bytes held while waiting for a frame delimiter.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Turns a byte stream into complete frames, keeping partial data across
/// deliveries.
#[derive(Debug)]
pub struct FrameReassembler {
    buf: BytesMut,
    max_frame: usize,
    /// Offset of the first byte of the line currently being scanned.
    line_start: usize,
    /// Offset up to which `buf` has been scanned for line terminators.
    scanned: usize,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::with_max_frame(MAX_FRAME_BYTES)
    }
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembler that refuses to hold more than `max_frame` bytes of an
    /// unfinished frame.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame,
            line_start: 0,
            scanned: 0,
        }
    }

    /// Append a delivery and return every frame it completed, in order.
    ///
    /// Fails once the unfinished remainder grows past the frame limit; the
    /// frames completed by this delivery are dropped with it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, FrameTooLarge> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        if self.buf.len() > self.max_frame {
            return Err(FrameTooLarge {
                buffered: self.buf.len(),
                max: self.max_frame,
            });
        }
        Ok(frames)
    }

    /// Flush whatever is left once upstream has ended cleanly.
    ///
    /// Providers sometimes omit the final blank line, so a non-empty
    /// remainder is treated as one last frame.
    pub fn finish(&mut self) -> Option<Frame> {
        let rest = self.take_all();
        let text = String::from_utf8_lossy(&rest);
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            None
        } else {
            Some(Frame::new(text))
        }
    }

    /// Drop buffered bytes without translating them. Returns how many were
    /// dropped.
    pub fn discard(&mut self) -> usize {
        self.take_all().len()
    }

    /// Number of bytes held that do not yet form a frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take_all(&mut self) -> BytesMut {
        self.line_start = 0;
        self.scanned = 0;
        self.buf.split()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let (at, len) = self.next_terminator()?;
            if at != self.line_start {
                // End of a non-empty line; the frame continues.
                self.line_start = at + len;
                continue;
            }

            // Blank line: everything before it is one frame.
            let raw = self.buf.split_to(at + len);
            self.line_start = 0;
            self.scanned = 0;

            let text = String::from_utf8_lossy(&raw[..at]);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                // Run of blank lines between frames.
                continue;
            }
            return Some(Frame::new(text));
        }
    }

    /// Find the next line terminator at or after `scanned`, returning its
    /// offset and length.
    fn next_terminator(&mut self) -> Option<(usize, usize)> {
        let rest = &self.buf[self.scanned..];
        let offset = rest.iter().position(|b| *b == b'\n' || *b == b'\r')?;
        let at = self.scanned + offset;

        let len = match self.buf[at] {
            b'\n' => 1,
            _ => match self.buf.get(at + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                // A lone trailing `\r` may be the first half of `\r\n`.
                None => {
                    self.scanned = at;
                    return None;
                }
            },
        };
        self.scanned = at + len;
        Some((at, len))
    }
}
