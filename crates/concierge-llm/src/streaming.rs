use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;

/// Incremental server-sent-events decoder.
///
/// Bytes arrive in arbitrary chunks; only complete blocks (terminated by a
/// blank line) are turned into events. `\r\n` line endings are normalised.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        if chunk.contains('\r') {
            self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(chunk);
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            // comment / keep-alive
            continue;
        }
        if let Some(val) = line.strip_prefix("event:") {
            event_type = Some(val.trim_start().to_string());
        } else if let Some(val) = line.strip_prefix("data:") {
            data_lines.push(val.strip_prefix(' ').unwrap_or(val).to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event_type,
        data: data_lines.join("\n"),
    })
}

/// Adapts a byte stream from `reqwest` into a stream of `SseEvent`s.
///
/// A transport error ends the stream; the caller sees a truncated reply.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
    carry: Vec<u8>,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            carry: Vec::new(),
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = SseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    // A multi-byte character may be split across chunks.
                    this.carry.extend_from_slice(&bytes);
                    let valid = match std::str::from_utf8(&this.carry) {
                        Ok(s) => s.len(),
                        Err(e) => e.valid_up_to(),
                    };
                    let text: Vec<u8> = this.carry.drain(..valid).collect();
                    let text = String::from_utf8_lossy(&text);
                    this.pending.extend(this.parser.feed(&text));
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(error = %e, "SSE transport error");
                    return Poll::Ready(None);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_parser_data_only() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: {\"choices\":[]}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, None);
        assert_eq!(events[0].data, "{\"choices\":[]}");
    }

    #[test]
    fn test_sse_parser_chunked() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"x\":").is_empty());
        let events = parser.feed("1}\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert_eq!(events[1].data, "[DONE]");
    }

    #[test]
    fn test_sse_parser_crlf_and_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\r\n\r\nevent: delta\r\ndata:abc\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "abc");
    }
}
