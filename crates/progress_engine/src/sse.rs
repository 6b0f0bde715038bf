/// Incremental `text/event-stream` framer.
///
/// Bytes go in as they arrive from the network; complete message payloads
/// (the joined `data:` lines of one event) come out. Lines are split on raw
/// bytes before UTF-8 decoding, so a multi-byte character split across chunks
/// is reassembled. `event:`, `id:` and `retry:` fields are accepted and ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: String,
    has_data: bool,
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut messages = Vec::new();
        for &byte in chunk {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\n' => self.end_line(&mut messages),
                b'\r' => {
                    self.end_line(&mut messages);
                    self.after_cr = true;
                }
                _ => self.line.push(byte),
            }
        }
        messages
    }

    fn end_line(&mut self, messages: &mut Vec<String>) {
        let raw = std::mem::take(&mut self.line);
        let decoded = String::from_utf8_lossy(&raw);
        let line = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);

        if line.is_empty() {
            if std::mem::take(&mut self.has_data) {
                let data = std::mem::take(&mut self.data);
                // An empty data block is a keep-alive, not a message.
                if !data.trim().is_empty() {
                    messages.push(data);
                }
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            if self.has_data {
                self.data.push('\n');
            }
            self.data.push_str(value);
            self.has_data = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SseDecoder;

    #[test]
    fn splits_events_on_blank_lines() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"data: {\"type\":\"heartbeat\"}\n\ndata: {\"type\":\"step\"}\n\n");
        assert_eq!(out, vec![r#"{"type":"heartbeat"}"#, r#"{"type":"step"}"#]);
    }

    #[test]
    fn joins_multi_line_data_and_skips_other_fields() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b": keep-alive\nevent: progress\nid: 7\nretry: 3000\ndata: {\"a\":\ndata: 1}\n\n");
        assert_eq!(out, vec!["{\"a\":\n1}"]);
    }

    #[test]
    fn handles_crlf_and_bare_cr() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"data: one\r\n\r\ndata: two\r\rdata:three\n\n");
        assert_eq!(out, vec!["one", "two", "three"]);
    }

    #[test]
    fn reassembles_across_chunk_boundaries() {
        let payload = "data: {\"message\":\"caf\u{e9}\"}\r\n\r\n".as_bytes();
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for byte in payload {
            out.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(out, vec!["{\"message\":\"caf\u{e9}\"}"]);
    }

    #[test]
    fn incomplete_event_is_held_back() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: partial").is_empty());
        assert!(decoder.feed(b"\n").is_empty());
        assert_eq!(decoder.feed(b"\n"), vec!["partial"]);
    }

    #[test]
    fn empty_data_is_a_keep_alive() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data:\n\n\n\n").is_empty());
    }
}
