//! Server-sent-events plumbing for the reply stream.
//!
//! The coach API streams teacher replies as `text/event-stream` frames
//! (`data: <json>\n\n`). [`SseParser`] reassembles payloads from arbitrarily
//! split byte chunks; [`run_stream_worker`] drives a response body, forwards
//! decoded events to the service, and stops promptly on cancellation.

use futures::StreamExt;
use glossa_core::coach::{ReplyDelta, StreamEvent};
use tokio::sync::{mpsc, oneshot};

/// Incremental SSE frame parser.
///
/// Bytes are buffered until a full line is available, so UTF-8 sequences and
/// frames split across chunk boundaries are handled transparently.
#[derive(Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    /// `data:` lines of the event currently being assembled.
    data: Vec<String>,
}

impl SseParser {
    /// Feeds a chunk and returns every completed event payload.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // blank line terminates the event
                if !self.data.is_empty() {
                    payloads.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // comments (`:`) and other fields (`event:`, `id:`, `retry:`)
            // carry nothing in this protocol
        }
        payloads
    }
}

/// Reads an event-stream response body until it ends, errors, or is
/// cancelled, forwarding decoded deltas to the service side.
pub(crate) async fn run_stream_worker(
    response: reqwest::Response,
    events: mpsc::UnboundedSender<StreamEvent>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut body = response.bytes_stream();
    let mut parser = SseParser::default();

    loop {
        tokio::select! {
            _ = &mut cancel => {
                tracing::debug!("reply stream cancelled");
                return;
            }
            chunk = body.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        for payload in parser.feed(&bytes) {
                            match serde_json::from_str::<ReplyDelta>(&payload) {
                                Ok(delta) => {
                                    if events.send(StreamEvent::Delta(delta)).is_err() {
                                        // consumer gone, stop reading
                                        return;
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "malformed stream payload");
                                    let _ = events.send(StreamEvent::Error(format!(
                                        "malformed stream payload: {err}"
                                    )));
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "reply stream transport failed");
                        let _ = events.send(StreamEvent::Error(format!(
                            "reply stream failed: {err}"
                        )));
                        return;
                    }
                    None => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_frame() {
        let mut parser = SseParser::default();
        let payloads = parser.feed(b"data: {\"delta\":\"Hi\"}\n\n");
        assert_eq!(payloads, vec![r#"{"delta":"Hi"}"#.to_string()]);
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"da").is_empty());
        assert!(parser.feed(b"ta: {\"delta\":\"He").is_empty());
        assert!(parser.feed(b"llo\"}\n").is_empty());
        let payloads = parser.feed(b"\ndata: second\n\n");
        assert_eq!(
            payloads,
            vec![r#"{"delta":"Hello"}"#.to_string(), "second".to_string()]
        );
    }

    #[test]
    fn tolerates_multibyte_text_split_mid_character() {
        let frame = "data: {\"delta\":\"日本語\"}\n\n".as_bytes();
        // split inside the first multibyte character
        let (head, tail) = frame.split_at(17);

        let mut parser = SseParser::default();
        assert!(parser.feed(head).is_empty());
        let payloads = parser.feed(tail);
        assert_eq!(payloads, vec![r#"{"delta":"日本語"}"#.to_string()]);
    }

    #[test]
    fn ignores_comments_and_crlf() {
        let mut parser = SseParser::default();
        let payloads = parser.feed(b": keep-alive\r\ndata: x\r\n\r\n");
        assert_eq!(payloads, vec!["x".to_string()]);
    }

    #[test]
    fn joins_multiple_data_lines() {
        let mut parser = SseParser::default();
        let payloads = parser.feed(b"data: one\ndata: two\n\n");
        assert_eq!(payloads, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn blank_frames_emit_nothing() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"\n\n\n").is_empty());
    }
}
