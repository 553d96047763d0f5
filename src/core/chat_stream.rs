//! Incremental decoding of a server-sent chat completion stream.
//!
//! [`DeltaStream`] pulls raw byte chunks from the response body, reassembles
//! `data:` lines across chunk boundaries, and yields the text of each delta in
//! arrival order. The body reader is dropped exactly once, whichever way the
//! stream ends.

use futures_util::stream::BoxStream;
use futures_util::Stream;
use memchr::memchr;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

use crate::api::{error_summary_from_body, ChatResponse};
use crate::core::chat_error::{ChatError, ChatErrorKind};

/// Payload that marks the end of a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Stream over a live HTTP response body.
pub type ResponseDeltaStream = DeltaStream<BoxStream<'static, reqwest::Result<bytes::Bytes>>>;

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// True when `body` carries at least one `data:` line.
pub fn is_event_stream_body(body: &[u8]) -> bool {
    String::from_utf8_lossy(body)
        .lines()
        .any(|line| extract_data_payload(line.trim()).is_some())
}

enum Frame {
    Delta(String),
    Empty,
    Done,
    Malformed,
}

fn parse_frame(line: &str) -> Frame {
    let Some(payload) = extract_data_payload(line) else {
        trace!(line, "ignoring non-data line");
        return Frame::Empty;
    };

    if payload == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => match response.first_content() {
            Some(content) => Frame::Delta(content.to_string()),
            None => Frame::Empty,
        },
        Err(err) => {
            match error_summary_from_body(payload) {
                Some(summary) => {
                    warn!(error = %err, summary = %summary, "skipping malformed stream frame")
                }
                None => warn!(error = %err, "skipping malformed stream frame"),
            }
            Frame::Malformed
        }
    }
}

pub struct DeltaStream<S> {
    reader: Option<S>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    accumulated: String,
    dropped_frames: usize,
    finished: bool,
}

impl<S> DeltaStream<S> {
    pub fn new(reader: S) -> Self {
        Self {
            reader: Some(reader),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            accumulated: String::new(),
            dropped_frames: 0,
            finished: false,
        }
    }

    /// Everything yielded so far, concatenated.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Frames skipped because they were not valid UTF-8 or JSON of the expected shape.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!(
                chars = self.accumulated.chars().count(),
                dropped_frames = self.dropped_frames,
                "released response reader"
            );
        }
    }

    fn drain_lines(&mut self) {
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.process_line(&line[..newline_pos]);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn process_line(&mut self, raw: &[u8]) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(err) => {
                warn!(error = %err, "skipping stream line with invalid UTF-8");
                self.skip_malformed();
                return;
            }
        };
        if line.is_empty() {
            return;
        }

        match parse_frame(line) {
            Frame::Delta(content) => {
                self.accumulated.push_str(&content);
                self.pending.push_back(content);
            }
            Frame::Empty => {}
            Frame::Done => {
                trace!("stream sentinel received");
                self.finished = true;
                self.release();
            }
            Frame::Malformed => self.skip_malformed(),
        }
    }

    fn skip_malformed(&mut self) {
        self.dropped_frames += 1;
        debug!(
            kind = ?ChatErrorKind::MalformedStreamFrame,
            dropped_frames = self.dropped_frames,
            "frame recovered locally"
        );
    }
}

impl<S> Drop for DeltaStream<S> {
    fn drop(&mut self) {
        if self.reader.is_some() {
            debug!("response stream abandoned before completion");
        }
        self.release();
    }
}

impl<S, B, E> Stream for DeltaStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<ChatError>,
{
    type Item = Result<String, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(fragment) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.finished {
                this.release();
                return Poll::Ready(None);
            }
            let Some(reader) = this.reader.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(reader).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(chunk.as_ref());
                    this.drain_lines();
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    this.pending.clear();
                    this.release();
                    return Poll::Ready(Some(Err(err.into())));
                }
                Poll::Ready(None) => {
                    let rest = std::mem::take(&mut this.buffer);
                    if !rest.is_empty() {
                        this.process_line(&rest);
                    }
                    this.finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Chunk = Result<Vec<u8>, ChatError>;

    /// Byte source that counts how many times it has been dropped.
    struct TrackedReader {
        inner: stream::Iter<std::vec::IntoIter<Chunk>>,
        drops: Arc<AtomicUsize>,
    }

    impl Stream for TrackedReader {
        type Item = Chunk;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(chunks: Vec<Chunk>) -> (DeltaStream<TrackedReader>, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let reader = TrackedReader {
            inner: stream::iter(chunks),
            drops: Arc::clone(&drops),
        };
        (DeltaStream::new(reader), drops)
    }

    fn chunks(parts: &[&str]) -> Vec<Chunk> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    fn delta_line(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}, "index": 0, "finish_reason": null}]})
        )
    }

    async fn collect_ok<S>(stream: &mut DeltaStream<S>) -> Vec<String>
    where
        DeltaStream<S>: Stream<Item = Result<String, ChatError>> + Unpin,
    {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.expect("unexpected stream error"));
        }
        out
    }

    #[tokio::test]
    async fn yields_deltas_in_order_and_stops_at_sentinel() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n",
            delta_line("Hel"),
            delta_line("lo"),
            delta_line(" world")
        );
        let (mut stream, drops) = tracked(chunks(&[&body]));

        let fragments = collect_ok(&mut stream).await;

        assert_eq!(fragments, vec!["Hel", "lo", " world"]);
        assert_eq!(stream.accumulated(), "Hello world");
        assert!(stream.is_released());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_line_is_skipped_without_ending_stream() {
        let body = format!(
            "{}data: {{\"choices\": [oops\n{}data: [DONE]\n",
            delta_line("first"),
            delta_line("second")
        );
        let (mut stream, _) = tracked(chunks(&[&body]));

        let fragments = collect_ok(&mut stream).await;

        assert_eq!(fragments, vec!["first", "second"]);
        assert_eq!(stream.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn error_frames_are_counted_not_surfaced() {
        let body = format!(
            "data: {{\"error\":{{\"message\":\"overloaded\"}}}}\n{}",
            delta_line("still here")
        );
        let (mut stream, _) = tracked(chunks(&[&body]));

        assert_eq!(collect_ok(&mut stream).await, vec!["still here"]);
        assert_eq!(stream.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let line = delta_line("split");
        let (head, tail) = line.split_at(17);
        let (mut stream, _) = tracked(chunks(&[head, tail, "data: [DONE]\n"]));

        assert_eq!(collect_ok(&mut stream).await, vec!["split"]);
        assert_eq!(stream.dropped_frames(), 0);
    }

    #[tokio::test]
    async fn multibyte_characters_split_across_chunks_survive() {
        let line = delta_line("héllo wörld");
        let bytes = line.as_bytes();
        let accent = line.find('é').expect("accent present");
        let parts: Vec<Chunk> = vec![
            Ok(bytes[..accent + 1].to_vec()),
            Ok(bytes[accent + 1..].to_vec()),
        ];
        let (mut stream, _) = tracked(parts);

        assert_eq!(collect_ok(&mut stream).await, vec!["héllo wörld"]);
    }

    #[tokio::test]
    async fn accepts_data_marker_without_space_and_crlf() {
        let body = "data:{\"choices\":[{\"delta\":{\"content\":\"tight\"}}]}\r\n\r\ndata:[DONE]\r\n";
        let (mut stream, _) = tracked(chunks(&[body]));

        assert_eq!(collect_ok(&mut stream).await, vec!["tight"]);
    }

    #[tokio::test]
    async fn ignores_non_data_lines_and_empty_deltas() {
        let body = format!(
            ": keep-alive\nevent: message\n{}data: {{\"choices\":[{{\"delta\":{{\"role\":\"assistant\"}}}}]}}\n{}",
            delta_line(""),
            delta_line("text")
        );
        let (mut stream, _) = tracked(chunks(&[&body]));

        assert_eq!(collect_ok(&mut stream).await, vec!["text"]);
        assert_eq!(stream.dropped_frames(), 0);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_processed_at_eof() {
        let line = delta_line("last");
        let (mut stream, drops) = tracked(chunks(&[line.trim_end()]));

        assert_eq!(collect_ok(&mut stream).await, vec!["last"]);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn content_after_sentinel_is_discarded() {
        let body = format!("{}data: [DONE]\n{}", delta_line("kept"), delta_line("late"));
        let (mut stream, _) = tracked(chunks(&[&body]));

        assert_eq!(collect_ok(&mut stream).await, vec!["kept"]);
    }

    #[tokio::test]
    async fn transport_error_is_yielded_once_then_stream_ends() {
        let parts = vec![
            Ok(delta_line("partial").into_bytes()),
            Err(ChatError::NetworkUnreachable("connection reset".to_string())),
            Ok(delta_line("never").into_bytes()),
        ];
        let (mut stream, drops) = tracked(parts);

        assert_eq!(stream.next().await, Some(Ok("partial".to_string())));
        assert_eq!(
            stream.next().await,
            Some(Err(ChatError::NetworkUnreachable(
                "connection reset".to_string()
            )))
        );
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoning_the_stream_releases_the_reader_once() {
        let body = format!("{}{}", delta_line("one"), delta_line("two"));
        let (mut stream, drops) = tracked(chunks(&[&body]));

        assert_eq!(stream.next().await, Some(Ok("one".to_string())));
        assert!(!stream.is_released());
        drop(stream);

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_on_completion_is_not_repeated_on_drop() {
        let (mut stream, drops) = tracked(chunks(&["data: [DONE]\n"]));

        assert_eq!(stream.next().await, None);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(stream);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_utf8_line_counts_as_dropped() {
        let mut bad = b"data: \xff\xfe\n".to_vec();
        bad.extend_from_slice(delta_line("ok").as_bytes());
        let (mut stream, _) = tracked(vec![Ok(bad)]);

        assert_eq!(collect_ok(&mut stream).await, vec!["ok"]);
        assert_eq!(stream.dropped_frames(), 1);
    }

    #[test]
    fn event_stream_bodies_are_recognised_by_data_lines() {
        assert!(is_event_stream_body(b": keep-alive\n\ndata: [DONE]\n"));
        assert!(is_event_stream_body(delta_line("hi").as_bytes()));
        assert!(!is_event_stream_body(br#"{"choices":[]}"#));
        assert!(!is_event_stream_body(b""));
    }
}
