//! Server-Sent Events decoding for streaming completions
//!
//! Both supported protocols stream `data: {json}` lines. The decoder
//! assembles lines from the raw byte stream, hands each payload to the
//! active [`ProviderTransport`] and forwards text deltas to the caller:
//!
//! - lines without the `data:` prefix (`event:`, comments, blanks) are ignored
//! - `data: [DONE]` or a transport-level terminal event ends the stream
//! - a line that fails to decode is logged and skipped
//! - end of input without a terminal event is [`LlmError::StreamTruncated`],
//!   carrying the last skipped decode error if there was one
//! - with an idle timeout set, a gap between chunks longer than it is
//!   [`LlmError::Timeout`]

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::{LlmError, LlmResult};
use crate::domain::models::StreamEvent;
use crate::domain::ports::{OnFragment, ProviderTransport};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// What a single line contributed to the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Nothing for the caller: non-data line, metadata event or malformed frame
    Skipped,
    /// A text fragment to deliver
    Fragment(String),
    /// The stream is complete
    Done,
}

/// Incremental line decoder over one streaming response.
pub struct StreamDecoder<'a> {
    transport: &'a dyn ProviderTransport,
    buffer: Vec<u8>,
    fragments: usize,
    skipped: usize,
    last_error: Option<String>,
    idle_timeout: Option<Duration>,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(transport: &'a dyn ProviderTransport) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
            fragments: 0,
            skipped: 0,
            last_error: None,
            idle_timeout: None,
        }
    }

    /// Fail with `Timeout` when no chunk arrives within `timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Malformed lines skipped so far.
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Decode one complete line (without its newline).
    pub fn feed_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim_end_matches('\r');

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return LineOutcome::Skipped;
        };
        let payload = payload.trim();

        if payload.is_empty() {
            return LineOutcome::Skipped;
        }
        if payload == DONE_SENTINEL {
            return LineOutcome::Done;
        }

        match self.transport.decode_stream_line(payload) {
            Ok(StreamEvent::Delta(text)) if !text.is_empty() => LineOutcome::Fragment(text),
            Ok(StreamEvent::Terminal) => LineOutcome::Done,
            Ok(_) => LineOutcome::Skipped,
            Err(err) => {
                self.skipped += 1;
                self.last_error = Some(err.to_string());
                warn!(
                    provider = self.transport.name(),
                    error = %err,
                    payload,
                    "skipping malformed stream event"
                );
                LineOutcome::Skipped
            }
        }
    }

    /// Drive `stream` to completion, calling `on_fragment` for each text delta.
    ///
    /// Returns the number of fragments delivered. Every chunk read races
    /// against `cancel` and, if set, the idle timeout.
    pub async fn decode<S, E>(
        &mut self,
        stream: S,
        cancel: &CancellationToken,
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<usize>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut stream = std::pin::pin!(stream);

        loop {
            while let Some(line) = self.next_line() {
                let line = match String::from_utf8(line) {
                    Ok(line) => line,
                    Err(err) => {
                        self.skipped += 1;
                        warn!(error = %err, "skipping stream line with invalid UTF-8");
                        continue;
                    }
                };

                match self.feed_line(&line) {
                    LineOutcome::Fragment(text) => {
                        self.fragments += 1;
                        on_fragment(&text);
                    }
                    LineOutcome::Done => {
                        debug!(
                            fragments = self.fragments,
                            skipped = self.skipped,
                            "stream completed"
                        );
                        return Ok(self.fragments);
                    }
                    LineOutcome::Skipped => {}
                }
            }

            let chunk = tokio::select! {
                () = cancel.cancelled() => return Err(LlmError::Cancelled),
                chunk = next_chunk(&mut stream, self.idle_timeout) => chunk?,
            };

            match chunk {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => return Err(LlmError::Stream(err.to_string())),
                None => {
                    // A final line without trailing newline may still hold the sentinel
                    if !self.buffer.is_empty() {
                        let rest = std::mem::take(&mut self.buffer);
                        let line = String::from_utf8_lossy(&rest).into_owned();
                        match self.feed_line(&line) {
                            LineOutcome::Done => return Ok(self.fragments),
                            LineOutcome::Fragment(text) => {
                                self.fragments += 1;
                                on_fragment(&text);
                            }
                            LineOutcome::Skipped => {}
                        }
                    }
                    warn!(
                        provider = self.transport.name(),
                        fragments = self.fragments,
                        "stream ended without terminal event"
                    );
                    return Err(LlmError::StreamTruncated {
                        last_error: self.last_error.take(),
                    });
                }
            }
        }
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        Some(line)
    }
}

async fn next_chunk<S>(stream: &mut S, idle_timeout: Option<Duration>) -> LlmResult<Option<S::Item>>
where
    S: Stream + Unpin,
{
    match idle_timeout {
        Some(timeout) => tokio::time::timeout(timeout, stream.next())
            .await
            .map_err(|_| LlmError::Timeout),
        None => Ok(stream.next().await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::llm::transport::{CompatTransport, NativeTransport};
    use futures::stream;

    fn transport() -> CompatTransport {
        CompatTransport::new("https://example.test/v1", "key").unwrap()
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n"
        )
    }

    fn chunks(parts: Vec<String>) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    async fn collect(parts: Vec<String>) -> (LlmResult<usize>, Vec<String>) {
        let transport = transport();
        let mut decoder = StreamDecoder::new(&transport);
        let mut received = Vec::new();
        let result = decoder
            .decode(chunks(parts), &CancellationToken::new(), &mut |text: &str| {
                received.push(text.to_string());
            })
            .await;
        (result, received)
    }

    #[tokio::test]
    async fn test_three_fragments_then_sentinel() {
        let (result, received) = collect(vec![
            delta("Hello"),
            delta(", "),
            delta("world"),
            "data: [DONE]\n\n".to_string(),
        ])
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(received, vec!["Hello", ", ", "world"]);
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let (result, received) = collect(vec![
            delta("one"),
            "data: {\"choices\": [\n".to_string(),
            delta("two"),
            "data: [DONE]\n".to_string(),
        ])
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(received, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_missing_sentinel_is_truncation() {
        let (result, received) = collect(vec![delta("partial")]).await;

        assert!(matches!(result, Err(LlmError::StreamTruncated { last_error: None })));
        assert_eq!(received, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_truncation_carries_last_decode_error() {
        let transport = NativeTransport::new("https://example.test", "key", "2023-06-01").unwrap();
        let mut decoder = StreamDecoder::new(&transport);
        let parts = vec![
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n".to_string(),
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n".to_string(),
        ];

        let result = decoder
            .decode(chunks(parts), &CancellationToken::new(), &mut |_: &str| {})
            .await;

        match result {
            Err(LlmError::StreamTruncated { last_error: Some(message) }) => {
                assert!(message.contains("overloaded_error"));
                assert!(message.contains("Overloaded"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_times_out() {
        let transport = transport();
        let mut decoder = StreamDecoder::new(&transport).with_idle_timeout(Duration::from_secs(30));
        let mut received = Vec::new();

        let parts = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(delta("a")))])
            .chain(stream::pending());
        let result = decoder
            .decode(parts, &CancellationToken::new(), &mut |text: &str| {
                received.push(text.to_string());
            })
            .await;

        assert!(matches!(result, Err(LlmError::Timeout)));
        assert_eq!(received, vec!["a"]);
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let full = format!("{}{}data: [DONE]\r\n", delta("ab"), delta("cd"));
        let parts: Vec<String> = full
            .as_bytes()
            .chunks(7)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();

        let (result, received) = collect(parts).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(received, vec!["ab", "cd"]);
    }

    #[tokio::test]
    async fn test_sentinel_without_trailing_newline() {
        let (result, received) =
            collect(vec![delta("x"), "data: [DONE]".to_string()]).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(received, vec!["x"]);
    }

    #[tokio::test]
    async fn test_read_error_is_returned() {
        let transport = transport();
        let mut decoder = StreamDecoder::new(&transport);
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(delta("a"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];

        let result = decoder
            .decode(stream::iter(parts), &CancellationToken::new(), &mut |_: &str| {})
            .await;
        assert!(matches!(result, Err(LlmError::Stream(msg)) if msg.contains("reset")));
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops_reading() {
        let transport = transport();
        let mut decoder = StreamDecoder::new(&transport);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = decoder
            .decode(stream::pending::<Result<Bytes, std::io::Error>>(), &cancel, &mut |_: &str| {})
            .await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[test]
    fn test_feed_line_ignores_non_data_lines() {
        let transport = transport();
        let mut decoder = StreamDecoder::new(&transport);

        assert_eq!(decoder.feed_line("event: ping"), LineOutcome::Skipped);
        assert_eq!(decoder.feed_line(": keepalive"), LineOutcome::Skipped);
        assert_eq!(decoder.feed_line(""), LineOutcome::Skipped);
        assert_eq!(decoder.feed_line("data: [DONE]"), LineOutcome::Done);
        assert_eq!(decoder.skipped(), 0);
    }
}
