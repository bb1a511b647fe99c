//! Line framing for `data:`-prefixed event streams.
//!
//! Bytes arrive in arbitrary fragments. [`LineBuffer`] holds them until a
//! newline completes a line, so a record split across fragments (or a UTF-8
//! sequence split across fragments) is only decoded once it is whole.

use bytes::{Buf, BytesMut};

/// Prefix that marks a content frame.
pub const DATA_PREFIX: &str = "data: ";

/// In-band end marker some upstreams send before closing.
pub const END_MARKER: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every line it completed, without the
    /// trailing `\n` (or `\r\n`). The incomplete tail stays buffered.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(fragment);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line = self.buffer.split_to(pos).to_vec();
            self.buffer.advance(1);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Classification of one complete upstream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A payload to forward, already de-quoted.
    Content(String),
    /// The in-band end marker. Informational only.
    EndMarker,
    /// Anything else: blank separators, comments, empty payloads.
    Ignored,
}

/// Interpret one line of the upstream stream.
pub fn parse_frame(line: &str) -> Frame {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };

    if payload == END_MARKER {
        return Frame::EndMarker;
    }
    if payload.trim().is_empty() {
        return Frame::Ignored;
    }

    Frame::Content(strip_quotes(payload).to_string())
}

/// Remove one layer of matching `"` or `'` around a payload.
pub fn strip_quotes(payload: &str) -> &str {
    for quote in ['"', '\''] {
        if payload.len() >= 2 && payload.starts_with(quote) && payload.ends_with(quote) {
            return &payload[1..payload.len() - 1];
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strings(lines: Vec<Vec<u8>>) -> Vec<String> {
        lines.into_iter().map(|l| String::from_utf8(l).unwrap()).collect()
    }

    #[test]
    fn test_line_split_across_fragments() {
        let mut buffer = LineBuffer::new();

        assert!(buffer.push(b"data: Hel").is_empty());
        assert_eq!(buffer.pending(), 9);

        let lines = as_strings(buffer.push(b"lo\n\ndata: wor"));
        assert_eq!(lines, vec!["data: Hello", ""]);

        let lines = as_strings(buffer.push(b"ld\r\n"));
        assert_eq!(lines, vec!["data: world"]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_multibyte_char_split_across_fragments() {
        let mut buffer = LineBuffer::new();
        let bytes = "data: café\n".as_bytes();
        let (head, tail) = bytes.split_at(bytes.len() - 2);

        assert!(buffer.push(head).is_empty());
        assert_eq!(as_strings(buffer.push(tail)), vec!["data: café"]);
    }

    #[test]
    fn test_parse_frame_kinds() {
        assert_eq!(parse_frame("data: Hello"), Frame::Content("Hello".into()));
        assert_eq!(parse_frame("data:  world"), Frame::Content(" world".into()));
        assert_eq!(parse_frame("data: [DONE]"), Frame::EndMarker);
        assert_eq!(parse_frame("data:    "), Frame::Ignored);
        assert_eq!(parse_frame(""), Frame::Ignored);
        assert_eq!(parse_frame(": keep-alive"), Frame::Ignored);
        assert_eq!(parse_frame("event: message"), Frame::Ignored);
    }

    #[test]
    fn test_quote_stripping_is_single_layer() {
        assert_eq!(parse_frame("data: \"Hel\""), Frame::Content("Hel".into()));
        assert_eq!(parse_frame("data: 'lo'"), Frame::Content("lo".into()));
        assert_eq!(strip_quotes("\"\"twice\"\""), "\"twice\"");
        assert_eq!(strip_quotes("\"unbalanced"), "\"unbalanced");
        assert_eq!(strip_quotes("'mixed\""), "'mixed\"");
        assert_eq!(strip_quotes("\""), "\"");
    }
}
