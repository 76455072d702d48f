//! Newline framing for device output
//!
//! Serial reads return whatever bytes happen to be in the driver buffer, so a
//! line can arrive split over several polls. Bytes are held until the newline
//! shows up.

use tracing::warn;

/// Default cap on buffered bytes without a newline
pub const DEFAULT_MAX_LINE: usize = 4096;

/// Streaming line decoder that keeps partial frames between reads
#[derive(Debug, Clone)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl LineBuffer {
    /// Create a decoder that drops unterminated data beyond `max_len` bytes
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
        }
    }

    /// Append freshly read bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() > self.max_len && !self.buffer.contains(&b'\n') {
            warn!(
                bytes = self.buffer.len(),
                "discarding unterminated serial data"
            );
            self.buffer.clear();
        }
    }

    /// Pop the next complete line, without its CR/LF terminator
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let frame: Vec<u8> = self.buffer.drain(..=end).collect();
        let text = String::from_utf8_lossy(&frame);
        Some(text.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered data
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
