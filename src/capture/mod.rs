//! Output capture
//!
//! Turns raw byte streams into complete, ANSI-stripped lines:
//! - [`LineBuffer`]: the buffering rule shared by every reader
//! - [`reader`]: async (child process pipes) and blocking readers
//! - [`redirect`]: temporary redirection of this process's stdout
//!
//! Only text up to and including the last newline of a read is delivered.
//! The trailing partial line waits for the next read, and is flushed as-is
//! when the stream ends.

pub mod reader;
pub mod redirect;

use std::sync::Arc;

pub use reader::{capture_child, pump_blocking};
pub use redirect::{capture_stdout, hold_stdout};

/// Consumer of captured text. Receives whole lines, plus one final partial
/// line at end of stream.
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Strip terminal colour and cursor escape sequences
pub fn strip_ansi(text: &str) -> String {
    strip_ansi_escapes::strip_str(text)
}

/// Line-buffering state for one stream
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read's worth of bytes.
    ///
    /// Returns the stripped text of every line completed by this chunk, or
    /// `None` if no newline arrived. Empty chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        if chunk.is_empty() {
            return None;
        }
        self.pending.extend_from_slice(chunk);

        let last_newline = self.pending.iter().rposition(|&b| b == b'\n')?;
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        Some(strip_ansi(&String::from_utf8_lossy(&complete)))
    }

    /// End of stream: hand back whatever is left, newline or not.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(strip_ansi(&String::from_utf8_lossy(&rest)))
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: &[&[u8]]) -> Vec<String> {
        let mut buf = LineBuffer::new();
        let mut out: Vec<String> = chunks.iter().filter_map(|c| buf.push(c)).collect();
        out.extend(buf.finish());
        out
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let out = feed(&[b"Hello\nWor", b"ld\n"]);
        assert_eq!(out, vec!["Hello\n", "World\n"]);
    }

    #[test]
    fn test_trailing_partial_flushed_at_eof() {
        let out = feed(&[b"a\nb", b"c"]);
        assert_eq!(out, vec!["a\n", "bc"]);
    }

    #[test]
    fn test_empty_chunk_ignored() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"par"), None);
        assert_eq!(buf.push(b""), None);
        assert!(buf.has_pending());
        assert_eq!(buf.push(b"t\n"), Some("part\n".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_multiple_lines_delivered_together() {
        let out = feed(&[b"one\ntwo\nthr", b"ee\n"]);
        assert_eq!(out, vec!["one\ntwo\n", "three\n"]);
    }

    #[test]
    fn test_ansi_stripped() {
        let out = feed(&[b"\x1b[32mOK\x1b[0m\n"]);
        assert_eq!(out, vec!["OK\n"]);
    }

    #[test]
    fn test_reconstruction_across_every_split() {
        let raw: &[u8] = b"\x1b[1mCPU\x1b[0m: 1234\nMemory:\n\x1b[31mfail\x1b[0m\ntail";
        let expected = strip_ansi(&String::from_utf8_lossy(raw));

        for a in 0..=raw.len() {
            for b in a..=raw.len() {
                let out = feed(&[&raw[..a], &raw[a..b], &raw[b..]]);
                assert_eq!(out.concat(), expected, "split at {a}/{b}");
            }
        }
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let raw = "测试\n".as_bytes();
        let out = feed(&[&raw[..2], &raw[2..]]);
        assert_eq!(out, vec!["测试\n"]);
    }
}
