//! Server-sent event framing over a chunked response body.
//!
//! Frames end at the first blank line (`\n\n` or `\r\n\r\n`). Only `data:` lines
//! are kept; `event:`, `id:`, `retry:` and comments are dropped.

use thiserror::Error;

const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;
/// Longest frame separator (`\r\n\r\n`) minus one.
const SEPARATOR_OVERLAP: usize = 3;

/// Payload of one complete frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// `data:` lines joined with `\n`.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Keep-alives and frames without data.
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum FrameError {
    #[error("SSE buffer exceeded maximum size (4 MiB)")]
    Overflow,
    #[error("Received invalid UTF-8 from SSE stream")]
    InvalidUtf8,
}

/// Accumulates body chunks and yields complete frames.
#[derive(Debug, Default)]
pub(crate) struct SseFramer {
    pending: Vec<u8>,
    /// Bytes of `pending` already searched without finding a separator.
    scanned: usize,
}

impl SseFramer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<(), FrameError> {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() > MAX_PENDING_BYTES {
            return Err(FrameError::Overflow);
        }
        Ok(())
    }

    /// Next complete frame, or `None` until more bytes arrive.
    pub(crate) fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        // A separator may straddle the previous scan limit.
        let from = self.scanned.saturating_sub(SEPARATOR_OVERLAP);
        let Some((end, separator)) = frame_end(&self.pending, from) else {
            self.scanned = self.pending.len();
            return None;
        };
        self.scanned = 0;
        let raw: Vec<u8> = self.pending.drain(..end + separator).take(end).collect();
        Some(
            std::str::from_utf8(&raw)
                .map(parse_frame)
                .map_err(|_| FrameError::InvalidUtf8),
        )
    }

    #[cfg(test)]
    fn pending(&self) -> &[u8] {
        &self.pending
    }
}

fn frame_end(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buffer.len()).find_map(|at| {
        let rest = &buffer[at..];
        if rest.starts_with(b"\n\n") {
            Some((at, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((at, 4))
        } else {
            None
        }
    })
}

fn parse_frame(text: &str) -> Frame {
    let mut values = text
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value));

    let Some(first) = values.next() else {
        return Frame::Empty;
    };
    let data = values.fold(first.to_string(), |mut data, value| {
        data.push('\n');
        data.push_str(value);
        data
    });

    if data == "[DONE]" {
        Frame::Done
    } else {
        Frame::Data(data)
    }
}
