//! Prompt buffer for terminal sessions.
//!
//! Output accumulates until the device prints its prompt. Only the last
//! `search_depth` bytes are matched against the prompt pattern, so reading
//! a long `show running-config` stays linear in its size.

use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Terminal output waiting for a prompt.
///
/// Escape sequences are dropped on the way in and backspaces erase the
/// byte before them, which undoes the ` \x08` pairs EOS emits when it
/// wraps long command echoes. The parser state survives between pushes,
/// so a sequence split across two reads is still removed.
pub struct PromptBuffer {
    bytes: Vec<u8>,
    search_depth: usize,
    parser: Parser,
}

impl PromptBuffer {
    pub fn new(search_depth: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Append raw channel data.
    pub fn push(&mut self, data: &[u8]) {
        let mut screen = Screen {
            out: &mut self.bytes,
        };
        self.parser.advance(&mut screen, data);
    }

    /// Whether `pattern` matches within the searched tail.
    pub fn tail_matches(&self, pattern: &Regex) -> bool {
        let start = self.bytes.len().saturating_sub(self.search_depth);
        pattern.is_match(&self.bytes[start..])
    }

    /// Hand out everything read so far and start over.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

struct Screen<'a> {
    out: &'a mut Vec<u8>,
}

impl Perform for Screen<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out
            .extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\r' | b'\t' => self.out.push(byte),
            0x08 => {
                self.out.pop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(buffer: &mut PromptBuffer) -> String {
        String::from_utf8(buffer.take()).unwrap()
    }

    #[test]
    fn test_color_codes_are_dropped() {
        let mut buffer = PromptBuffer::new(100);
        buffer.push(b"\x1b[32mleaf1\x1b[0m#");
        assert_eq!(contents(&mut buffer), "leaf1#");
    }

    #[test]
    fn test_sequence_split_across_reads() {
        let mut buffer = PromptBuffer::new(100);
        buffer.push(b"leaf1\x1b[3");
        buffer.push(b"2m#");
        assert_eq!(contents(&mut buffer), "leaf1#");
    }

    #[test]
    fn test_backspace_erases() {
        let mut buffer = PromptBuffer::new(100);
        buffer.push(b"show ver \x08sion\r\n");
        assert_eq!(contents(&mut buffer), "show version\r\n");
    }

    #[test]
    fn test_prompt_only_found_in_tail() {
        let prompt = Regex::new(r"leaf1#\s*$").unwrap();

        let mut buffer = PromptBuffer::new(20);
        buffer.push(&[b'x'; 100]);
        buffer.push(b"\nleaf1#");
        assert!(buffer.tail_matches(&prompt));

        let mut buffer = PromptBuffer::new(10);
        buffer.push(b"leaf1#\n");
        buffer.push(&[b'x'; 100]);
        assert!(!buffer.tail_matches(&prompt));
    }

    #[test]
    fn test_take_resets() {
        let mut buffer = PromptBuffer::new(100);
        buffer.push(b"Arista vEOS");
        assert_eq!(buffer.take(), b"Arista vEOS".to_vec());
        assert!(buffer.is_empty());
    }
}
