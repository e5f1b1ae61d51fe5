// ABOUTME: Newline-delimited JSON framing for the raw socket transport
// ABOUTME: Buffers partial reads and yields one parsed message per complete line

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Malformed message: {source} - Line: {line}")]
    Malformed {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Incremental decoder for newline-delimited JSON
///
/// Chunks are appended to an internal buffer; every newline completes one message.
/// Bytes after the last newline stay buffered until the next chunk arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to contain no newline
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every message completed by it, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Value, FrameError>> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            if let Some(message) = Self::parse_line(&self.buffer[start..end]) {
                messages.push(message);
            }
            start = end + 1;
            search_from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        messages
    }

    /// Flush whatever remains buffered once the stream has ended
    pub fn finish(&mut self) -> Option<Result<Value, FrameError>> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        Self::parse_line(&rest)
    }

    /// Number of bytes waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn parse_line(raw: &[u8]) -> Option<Result<Value, FrameError>> {
        let line = String::from_utf8_lossy(raw);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(
            serde_json::from_str(trimmed).map_err(|source| FrameError::Malformed {
                line: trimmed.to_string(),
                source,
            }),
        )
    }
}

/// Serialize a message as one newline-terminated line
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    const STREAM: &str = "{\"a\":1}\n{\"b\":2}";

    fn decode_split(split: usize) -> Vec<Value> {
        let bytes = STREAM.as_bytes();
        let mut decoder = FrameDecoder::new();
        let mut messages: Vec<Value> = decoder
            .push(&bytes[..split])
            .into_iter()
            .chain(decoder.push(&bytes[split..]))
            .map(|m| m.unwrap())
            .collect();
        if let Some(last) = decoder.finish() {
            messages.push(last.unwrap());
        }
        messages
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(7)]
    #[case(8)]
    #[case(10)]
    #[case(15)]
    fn test_messages_split_across_chunks(#[case] split: usize) {
        let messages = decode_split(split);
        assert_eq!(messages, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_every_split_point_yields_two_messages_in_order() {
        for split in 0..=STREAM.len() {
            assert_eq!(
                decode_split(split),
                vec![json!({"a": 1}), json!({"b": 2})],
                "split at {}",
                split
            );
        }
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.push(b"{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n");
        assert_eq!(messages.len(), 3);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"{\"id\":").is_empty());
        assert_eq!(decoder.pending(), 6);

        let messages = decoder.push(b"1}\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_ref().unwrap(), &json!({"id": 1}));
    }

    #[test]
    fn test_malformed_line_does_not_poison_the_stream() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.push(b"not json\n{\"ok\":true}\n");

        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], Err(FrameError::Malformed { .. })));
        assert_eq!(messages[1].as_ref().unwrap(), &json!({"ok": true}));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let messages = decoder.push(b"\n\r\n  \n{\"x\":0}\r\n");
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_long_line_in_small_chunks_decodes_in_linear_time() {
        let payload = "a".repeat(8 * 1024 * 1024);
        let line = format!("{{\"t\":\"{}\"}}\n", payload);
        let mut decoder = FrameDecoder::new();

        let started = std::time::Instant::now();
        let mut messages = Vec::new();
        for chunk in line.as_bytes().chunks(8 * 1024) {
            messages.extend(decoder.push(chunk));
        }
        let elapsed = started.elapsed();

        assert_eq!(messages.len(), 1);
        let message = messages.remove(0).unwrap();
        assert_eq!(message["t"].as_str().map(str::len), Some(payload.len()));
        assert_eq!(decoder.pending(), 0);
        assert!(elapsed < std::time::Duration::from_secs(3), "took {:?}", elapsed);
    }

    #[test]
    fn test_newline_in_later_chunk_completes_buffered_prefix() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"{\"id\":").is_empty());
        assert!(decoder.push(b"4").is_empty());
        let messages = decoder.push(b"2}\n{\"id\":");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_ref().unwrap(), &json!({"id": 42}));
        assert_eq!(decoder.pending(), 6);
    }

    #[test]
    fn test_encode_line_appends_newline() {
        let bytes = encode_line(&json!({"a": 1})).unwrap();
        assert_eq!(bytes, b"{\"a\":1}\n");
    }
}
