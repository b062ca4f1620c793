//! Line framing over arbitrarily split byte chunks

use crate::errors::{AppError, Result};

/// Longest unterminated line a stream may hold
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates bytes until a full line is available
///
/// Bytes are buffered rather than text so a multi-byte character split
/// across two chunks decodes correctly.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_bytes: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes,
        }
    }

    /// Append a chunk and drain every complete line, without terminators
    ///
    /// Fails once the unterminated tail outgrows the line limit; the
    /// buffer is cleared so nothing more is held for the broken line.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return self.check_limit().map(|()| Vec::new());
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        self.check_limit()?;

        Ok(complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(decode)
            .collect())
    }

    fn check_limit(&mut self) -> Result<()> {
        if self.pending.len() <= self.max_line_bytes {
            return Ok(());
        }
        let held = self.pending.len();
        self.pending = Vec::new();
        Err(AppError::StreamProtocol {
            message: format!(
                "line exceeds {} bytes ({} held without a terminator)",
                self.max_line_bytes, held
            ),
        })
    }

    /// Whatever trails the last newline; called once the stream ends
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(decode(&rest))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
