//! Frame Decoder
//!
//! Turns raw response body chunks into `data:` payload strings. Chunk
//! boundaries are whatever the network produced: a record may be split across
//! many chunks (even inside a UTF-8 sequence or between the two newlines of a
//! delimiter) and one chunk may carry many records.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};

/// Separator between records (a blank line)
pub const FRAME_DELIMITER: &str = "\n\n";

/// Prefix a record must carry to yield a payload
pub const DATA_PREFIX: &str = "data:";

// ============================================================================
// Incremental UTF-8
// ============================================================================

/// Stateful UTF-8 decoder that carries incomplete sequences between chunks
///
/// Invalid sequences decode to U+FFFD; an incomplete trailing sequence is held
/// back until the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with no carried bytes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning every character completed by it
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    // valid_up_to guarantees this range is well-formed
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + bad;
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush at end of input; a dangling partial sequence becomes U+FFFD
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Number of bytes held back waiting for the rest of a sequence
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// Frame splitting
// ============================================================================

/// Splits a text stream into blank-line-delimited records and extracts the
/// `data:` payloads
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    records_seen: u64,
}

impl FrameDecoder {
    /// Create an empty decoder for one stream
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the payloads of every record it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        let Some(last) = self.buffer.rfind(FRAME_DELIMITER) else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last + FRAME_DELIMITER.len());
        let complete = std::mem::replace(&mut self.buffer, rest);

        let mut payloads = Vec::new();
        for record in complete.split(FRAME_DELIMITER) {
            if let Some(payload) = extract_payload(record) {
                self.records_seen += 1;
                payloads.push(payload.to_string());
            } else if !record.trim().is_empty() {
                tracing::trace!(record = %record.trim(), "Ignoring record without data prefix");
            }
        }
        payloads
    }

    /// End of stream: discard whatever partial record remains
    ///
    /// Returns the number of characters thrown away.
    pub fn finish(&mut self) -> usize {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let discarded = self.buffer.chars().count();
        if !self.buffer.trim().is_empty() {
            tracing::debug!(
                discarded = discarded,
                "Discarding incomplete record at end of stream"
            );
        }
        self.buffer.clear();
        discarded
    }

    /// Text received but not yet terminated by a delimiter
    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Count of `data:` payloads produced so far
    #[must_use]
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }
}

/// Trim a record and strip the `data:` prefix
fn extract_payload(record: &str) -> Option<&str> {
    record
        .trim()
        .strip_prefix(DATA_PREFIX)
        .map(str::trim)
}

// ============================================================================
// Lazy stream adapter
// ============================================================================

/// Adapt a byte-chunk stream into a lazy stream of payload strings
///
/// A read error is yielded once and ends the stream. On a clean end of input
/// any partial record is discarded and the stream ends.
pub fn payload_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = (
        Box::pin(bytes),
        FrameDecoder::new(),
        VecDeque::<String>::new(),
        false,
    );

    futures::stream::unfold(
        state,
        |(mut bytes, mut decoder, mut ready, mut ended)| async move {
            loop {
                if let Some(payload) = ready.pop_front() {
                    return Some((Ok(payload), (bytes, decoder, ready, ended)));
                }
                if ended {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => ready.extend(decoder.push(chunk.as_ref())),
                    Some(Err(e)) => {
                        ended = true;
                        return Some((Err(e), (bytes, decoder, ready, ended)));
                    }
                    None => {
                        decoder.finish();
                        ended = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed_in_pieces(input: &[u8], sizes: &[usize]) -> Vec<String> {
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        let mut offset = 0;
        let mut i = 0;
        while offset < input.len() {
            let size = sizes[i % sizes.len()].max(1);
            let end = (offset + size).min(input.len());
            out.extend(decoder.push(&input[offset..end]));
            offset = end;
            i += 1;
        }
        decoder.finish();
        out
    }

    #[test]
    fn test_single_chunk_multiple_records() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(b"data: one\n\ndata: two\n\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec!["one", "two", "[DONE]"]);
        assert_eq!(decoder.buffered(), "");
    }

    #[test]
    fn test_partial_record_is_retained() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"tok").is_empty());
        assert_eq!(decoder.buffered(), "data: {\"type\":\"tok");

        let payloads = decoder.push(b"en\",\"text\":\"hi\"}\n\n");
        assert_eq!(payloads, vec![r#"{"type":"token","text":"hi"}"#]);
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: a\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: b\n"), vec!["a"]);
        assert_eq!(decoder.push(b"\n"), vec!["b"]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        // "é" is 0xC3 0xA9, "😀" is four bytes
        let input = "data: caf\u{e9} \u{1F600}\n\n".as_bytes();
        let split = input.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let emoji = input.iter().position(|b| *b == 0xF0).unwrap() + 2;

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&input[..split]).is_empty());
        assert!(decoder.push(&input[split..emoji]).is_empty());
        assert_eq!(decoder.push(&input[emoji..]), vec!["caf\u{e9} \u{1F600}"]);
    }

    #[test]
    fn test_any_chunking_yields_same_payloads() {
        let input = "data: {\"type\":\"token\",\"text\":\"Der Vertrag\"}\n\n\
                     data: {\"type\":\"token\",\"text\":\" endet \u{fc}berm\u{f6}rgen\"}\n\n\
                     data: {\"type\":\"sources\",\"sources\":[]}\n\n\
                     data: [DONE]\n\n";
        let expected = feed_in_pieces(input.as_bytes(), &[input.len()]);
        assert_eq!(expected.len(), 4);

        let cases: [&[usize]; 6] = [&[1], &[2], &[3], &[5, 1], &[7, 2, 1], &[64]];
        for sizes in cases {
            assert_eq!(
                feed_in_pieces(input.as_bytes(), sizes),
                expected,
                "chunk sizes {sizes:?}"
            );
        }
    }

    #[test]
    fn test_records_without_data_prefix_are_dropped() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(b": keepalive\n\nevent: ping\n\n\n\ndata:tight\n\n");
        assert_eq!(payloads, vec!["tight"]);
        assert_eq!(decoder.records_seen(), 1);
    }

    #[test]
    fn test_finish_discards_leftover() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: complete\n\ndata: trunc");
        assert_eq!(decoder.finish(), "data: trunc".len());
        assert_eq!(decoder.buffered(), "");
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut utf8 = Utf8Decoder::new();
        assert_eq!(utf8.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(utf8.decode(b"\xE2\x82"), "");
        assert_eq!(utf8.pending_len(), 2);
        assert_eq!(utf8.decode(b"\xAC"), "\u{20AC}");
        assert_eq!(utf8.decode(b"\xE2"), "");
        assert_eq!(utf8.finish(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn test_payload_stream_is_lazy_over_chunks() {
        let chunks: Vec<Result<&[u8], std::io::Error>> = vec![
            Ok(b"data: on".as_slice()),
            Ok(b"e\n\ndata: two\n\nda".as_slice()),
            Ok(b"ta: three\n\n".as_slice()),
            Ok(b"data: partial".as_slice()),
        ];
        let payloads: Vec<String> = payload_stream(futures::stream::iter(chunks))
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(payloads, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_payload_stream_surfaces_read_error_once() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"data: before\n\n".as_slice()),
            Err("connection reset".to_string()),
            Ok(b"data: after\n\n".as_slice()),
        ];
        let items: Vec<Result<String, String>> =
            payload_stream(futures::stream::iter(chunks)).collect().await;
        assert_eq!(
            items,
            vec![Ok("before".to_string()), Err("connection reset".to_string())]
        );
    }
}
