//! Incremental newline-delimited framing for the client TCP stream.
//!
//! Wire format:
//! ```text
//! <frame bytes>\n<frame bytes>\n...
//! ```
//! A frame is every byte up to (not including) a single `\n`.  No escaping,
//! no length prefix.
//!
//! # Why a buffer is needed
//!
//! TCP is a stream protocol.  There is no guarantee that a single `read()`
//! call returns exactly one complete line:
//!
//! - It may return half a line (partial read).
//! - It may return several lines at once (coalesced reads).
//!
//! [`LineFramer`] accumulates bytes across calls and hands out complete frames
//! as they become available.  The partial tail stays buffered until a later
//! [`LineFramer::feed`] completes it.

use thiserror::Error;

/// Default cap on a single frame, in bytes (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

const DELIMITER: u8 = b'\n';

/// Errors produced while splitting the byte stream into frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A frame grew past the configured cap before its delimiter arrived.
    ///
    /// The offending bytes are discarded up to and including the next `\n`.
    #[error("frame exceeds maximum length: {len} bytes, limit is {max}")]
    FrameTooLong { len: usize, max: usize },
}

/// Splits an inbound byte stream into newline-delimited frames.
///
/// # Examples
///
/// ```rust
/// use tcpgw_core::LineFramer;
///
/// let mut framer = LineFramer::new();
/// let first: Vec<_> = framer.feed(b"{\"op\":1}\n{\"op\"").collect();
/// assert_eq!(first, vec![Ok(b"{\"op\":1}".to_vec())]);
///
/// let second: Vec<_> = framer.feed(b":2}\n").collect();
/// assert_eq!(second, vec![Ok(b"{\"op\":2}".to_vec())]);
/// ```
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes received but not yet handed out as a frame.
    buf: Vec<u8>,
    /// Prefix of `buf` already searched for a delimiter.
    scanned: usize,
    /// `None` means frames may grow without limit.
    max_frame_len: Option<usize>,
    /// Set after an oversize frame: drop bytes until the next delimiter.
    discarding: bool,
}

impl LineFramer {
    /// Creates a framer with no frame-size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a framer that rejects frames longer than `max` bytes.
    pub fn with_max_frame_len(max: usize) -> Self {
        Self {
            max_frame_len: Some(max),
            ..Self::default()
        }
    }

    /// The configured frame-size cap, if any.
    pub fn max_frame_len(&self) -> Option<usize> {
        self.max_frame_len
    }

    /// Appends `bytes` to the buffer and returns an iterator over every frame
    /// that is now complete.
    ///
    /// The iterator is lazy.  Frames it does not yield (because the caller
    /// stopped early) remain buffered and come out of the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.buf.extend_from_slice(bytes);
        Frames { framer: self }
    }

    /// Number of bytes currently buffered (an incomplete trailing frame).
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Called at end-of-input.  Discards any unterminated remainder and
    /// returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        self.scanned = 0;
        self.discarding = false;
        dropped
    }

    fn next_frame(&mut self) -> Option<Result<Vec<u8>, FrameError>> {
        loop {
            let start = self.scanned;
            let Some(offset) = self.buf[start..].iter().position(|&b| b == DELIMITER) else {
                self.scanned = self.buf.len();
                return self.check_pending_len();
            };

            let end = start + offset;
            self.scanned = 0;

            if self.discarding {
                // Tail of a frame that was already reported as too long.
                self.buf.drain(..=end);
                self.discarding = false;
                continue;
            }

            if let Some(max) = self.max_frame_len {
                if end > max {
                    self.buf.drain(..=end);
                    return Some(Err(FrameError::FrameTooLong { len: end, max }));
                }
            }

            let mut frame: Vec<u8> = self.buf.drain(..=end).collect();
            frame.pop();
            return Some(Ok(frame));
        }
    }

    /// With no delimiter in sight, enforce the cap on the pending bytes.
    fn check_pending_len(&mut self) -> Option<Result<Vec<u8>, FrameError>> {
        let max = self.max_frame_len?;
        if self.discarding {
            self.buf.clear();
            self.scanned = 0;
            return None;
        }
        if self.buf.len() <= max {
            return None;
        }

        let len = self.buf.len();
        self.buf.clear();
        self.scanned = 0;
        self.discarding = true;
        Some(Err(FrameError::FrameTooLong { len, max }))
    }
}

/// Lazy iterator over the frames completed by one [`LineFramer::feed`] call.
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Vec<u8>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_frame()
    }
}

/// Makes an outbound frame safe to write as exactly one line.
///
/// Frames without a raw `\n` are returned unchanged, byte for byte.  A JSON
/// document that spans several lines (pretty-printed) is re-serialized
/// compactly; escaped newlines inside strings survive as `\n` escapes.
/// Anything else containing a newline cannot be framed and yields `None`.
pub fn to_single_line(raw: String) -> Option<String> {
    if !raw.contains('\n') {
        return Some(raw);
    }
    serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .map(|value| value.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
