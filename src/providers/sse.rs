//! Server-Sent Events framing for upstream streaming responses.
//!
//! All three providers stream completions as SSE over HTTP. This parser
//! consumes the raw byte stream and yields one event per `data:` block;
//! payload interpretation is left to each adapter.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use pin_project_lite::pin_project;

/// A single upstream SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, when the provider sets one (Anthropic does).
    pub event: Option<String>,
    /// Concatenated `data:` payload lines.
    pub data: String,
}

pin_project! {
    /// Parses a byte stream into [`SseEvent`]s.
    pub struct SseStream<S> {
        #[pin]
        bytes: S,
        buffer: String,
        pending: VecDeque<SseEvent>,
    }
}

impl<S> SseStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    pub fn new(bytes: S) -> Self {
        Self {
            bytes,
            buffer: String::new(),
            pending: VecDeque::new(),
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    type Item = Result<SseEvent, reqwest::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(event) = this.pending.pop_front() {
            return Poll::Ready(Some(Ok(event)));
        }

        loop {
            match this.bytes.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    // Providers differ on line endings; normalize before
                    // splitting on blank lines.
                    if this.buffer.contains('\r') {
                        *this.buffer = this.buffer.replace("\r\n", "\n");
                    }

                    while let Some(pos) = this.buffer.find("\n\n") {
                        let block: String = this.buffer.drain(..pos).collect();
                        this.buffer.drain(..2);
                        if let Some(event) = parse_block(&block) {
                            this.pending.push_back(event);
                        }
                    }

                    if let Some(event) = this.pending.pop_front() {
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    if !this.buffer.is_empty() {
                        if let Some(event) = parse_block(this.buffer) {
                            this.pending.push_back(event);
                        }
                        this.buffer.clear();
                    }
                    return Poll::Ready(this.pending.pop_front().map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data = String::new();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }

    if data.is_empty() && event.is_none() {
        return None;
    }
    Some(SseEvent { event, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    async fn collect(input: Vec<&str>) -> Vec<SseEvent> {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = input
            .into_iter()
            .map(|s| Ok(Bytes::from(s.to_string())))
            .collect();
        SseStream::new(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_parses_data_events() {
        let events = collect(vec!["data: hello\n\ndata: world\n\n"]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "world");
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let events = collect(vec!["data: hel", "lo\n\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[tokio::test]
    async fn test_named_events() {
        let events =
            collect(vec!["event: content_block_delta\ndata: {\"x\":1}\n\n"]).await;
        assert_eq!(events[0].event.as_deref(), Some("content_block_delta"));
        assert_eq!(events[0].data, "{\"x\":1}");
    }

    #[tokio::test]
    async fn test_crlf_line_endings() {
        let events = collect(vec!["data: hello\r\n\r\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[tokio::test]
    async fn test_trailing_block_without_blank_line() {
        let events = collect(vec!["data: tail"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "tail");
    }
}
