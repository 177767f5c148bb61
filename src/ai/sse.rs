//! Line splitter turning an upstream server-sent-event body into relayed events.

use super::envelope::{DATA_PREFIX, DONE_MARKER};

/// Incremental decoder for an SSE response body.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks survive. `data:` lines are
/// normalised to `data: <payload>`; other non-blank lines are forwarded
/// as-is. Decoding stops at the terminal marker.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the terminal marker has been emitted.
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk and collect every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(chunk);
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.decode_line(&line[..newline], &mut events);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// End of body: decode any unterminated last line and make sure the
    /// stream ends with the terminal marker.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.done {
            let rest = std::mem::take(&mut self.buffer);
            self.decode_line(&rest, &mut events);
        }
        if !self.done {
            tracing::debug!("stream ended without terminal marker");
            self.done = true;
            events.push(done_event());
        }
        events
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<String>) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches('\r');
        if line.is_empty() {
            return;
        }
        match line.strip_prefix(DATA_PREFIX) {
            Some(data) => {
                let data = data.trim();
                if data == DONE_MARKER {
                    self.done = true;
                    events.push(done_event());
                } else {
                    events.push(format!("{DATA_PREFIX} {data}"));
                }
            }
            None => events.push(line.to_string()),
        }
    }
}

fn done_event() -> String {
    format!("{DATA_PREFIX} {DONE_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_lines_and_normalises_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data:{\"a\":1}\r\n\r\nevent: ping\n");
        assert_eq!(events, vec!["data: {\"a\":1}", "event: ping"]);
    }

    #[test]
    fn test_partial_lines_wait_for_newline() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\n"), vec!["data: {\"a\":1}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "data: 你好\n".as_bytes();
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..8]).is_empty());
        assert_eq!(decoder.push(&bytes[8..]), vec!["data: 你好"]);
    }

    #[test]
    fn test_stops_at_terminal_marker() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: x\ndata: [DONE]\ndata: late\n");
        assert_eq!(events, vec!["data: x", "data: [DONE]"]);
        assert!(decoder.is_done());
        assert!(decoder.push(b"data: more\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_finish_synthesises_marker() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: x\n");
        assert_eq!(decoder.finish(), vec!["data: [DONE]"]);
    }

    #[test]
    fn test_finish_decodes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: tail");
        assert_eq!(decoder.finish(), vec!["data: tail", "data: [DONE]"]);
    }
}
