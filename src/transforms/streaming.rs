//! SSE stream transcoding.
//!
//! Upstream `data:` lines are normalized one by one into OpenAI
//! `chat.completion.chunk` events and forwarded immediately. Every stream
//! the client sees ends with exactly one `data: [DONE]` event, whether or
//! not the upstream sent one.

use std::convert::Infallible;
use std::fmt::Display;

use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::common::generate_chat_id;
use super::openai_compat::normalize_stream_chunk;
use crate::constants::{MAX_BUFFERED_BYTES, STREAM_DONE};

/// The terminator event, byte for byte
pub const DONE_EVENT: &str = "data: [DONE]\n\n";

/// What a single upstream line turned into.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank, comment, non-data, or malformed line
    Skip,
    /// A normalized event, framed and ready to send
    Event(Bytes),
    /// The upstream terminator; nothing after it is read
    Done,
}

/// Per-stream state: one chat id for every chunk, and whether `[DONE]` went out.
pub struct ChunkTranscoder {
    chat_id: String,
    model: String,
    done_sent: bool,
    forwarded: usize,
}

impl ChunkTranscoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_chat_id(model, generate_chat_id())
    }

    pub fn with_chat_id(model: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            model: model.into(),
            done_sent: false,
            forwarded: 0,
        }
    }

    #[cfg(test)]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Turn one upstream line into at most one client event.
    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else {
            return LineOutcome::Skip;
        };
        let payload = payload.trim();

        if payload.is_empty() {
            return LineOutcome::Skip;
        }
        if payload == STREAM_DONE {
            return LineOutcome::Done;
        }

        match normalize_stream_chunk(payload, &self.model, &self.chat_id) {
            Ok(chunk) => match serde_json::to_string(&chunk) {
                Ok(json) => {
                    self.forwarded += 1;
                    LineOutcome::Event(Bytes::from(format!("data: {json}\n\n")))
                }
                Err(e) => {
                    warn!("Dropping chunk that failed to encode: {e}");
                    LineOutcome::Skip
                }
            },
            Err(e) => {
                debug!("Skipping malformed stream chunk: {e}");
                LineOutcome::Skip
            }
        }
    }

    /// The terminator if it hasn't gone out yet; `None` afterwards.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.done_sent {
            return None;
        }
        self.done_sent = true;
        Some(Bytes::from_static(DONE_EVENT.as_bytes()))
    }
}

/// Transcode an upstream SSE byte stream into the client-facing SSE stream.
///
/// Upstream read errors end the stream early but still produce the
/// terminator. Dropping the returned stream (client gone) drops `body`,
/// which releases the upstream connection.
pub fn transcode_stream<S, E>(
    body: S,
    model: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    stream! {
        let mut transcoder = ChunkTranscoder::new(model.clone());
        let mut buffer: Vec<u8> = Vec::new();
        let mut body = std::pin::pin!(body);
        let mut upstream_open = true;

        'read: while upstream_open {
            let lines = match body.next().await {
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(&chunk);
                    if buffer.len() > MAX_BUFFERED_BYTES && !buffer.contains(&b'\n') {
                        warn!("stream error: line exceeds {MAX_BUFFERED_BYTES} bytes");
                        break 'read;
                    }
                    drain_lines(&mut buffer)
                }
                Some(Err(e)) => {
                    warn!("stream error: {e}");
                    break 'read;
                }
                None => {
                    upstream_open = false;
                    // An unterminated last line is still a line
                    let rest = std::mem::take(&mut buffer);
                    if rest.is_empty() { Vec::new() } else { vec![rest] }
                }
            };

            for line in lines {
                match transcoder.process_line(&String::from_utf8_lossy(&line)) {
                    LineOutcome::Skip => {}
                    LineOutcome::Event(event) => yield Ok(event),
                    LineOutcome::Done => break 'read,
                }
            }
        }

        if let Some(done) = transcoder.finish() {
            yield Ok(done);
        }

        info!("stream {} -> {} chunks", model, transcoder.forwarded);
    }
}

/// Split complete `\n`-terminated lines off the front of `buffer`.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        line.pop();
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::Value;

    fn ok_chunks(parts: &[&str]) -> Vec<Result<Bytes, std::io::Error>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect()
    }

    async fn collect_events<S, E>(body: S) -> Vec<String>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let out: Vec<Bytes> = transcode_stream(body, "glm-4.7".to_string())
            .map(|item| match item {
                Ok(bytes) => bytes,
                Err(never) => match never {},
            })
            .collect()
            .await;
        let text: String = out
            .iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect();
        text.split_terminator("\n\n").map(str::to_string).collect()
    }

    fn event_json(event: &str) -> Value {
        serde_json::from_str(event.strip_prefix("data: ").unwrap()).unwrap()
    }

    #[test]
    fn test_process_line_skips_noise() {
        let mut t = ChunkTranscoder::with_chat_id("m", "chatcmpl-a");
        assert_eq!(t.process_line(""), LineOutcome::Skip);
        assert_eq!(t.process_line(": keep-alive"), LineOutcome::Skip);
        assert_eq!(t.process_line("event: message"), LineOutcome::Skip);
        assert_eq!(t.process_line("data:"), LineOutcome::Skip);
        assert_eq!(t.process_line("data: {broken"), LineOutcome::Skip);
    }

    #[test]
    fn test_process_line_detects_done() {
        let mut t = ChunkTranscoder::with_chat_id("m", "chatcmpl-a");
        assert_eq!(t.process_line("data: [DONE]"), LineOutcome::Done);
        assert_eq!(t.process_line("data:[DONE]  "), LineOutcome::Done);
    }

    #[test]
    fn test_process_line_normalizes_chunk() {
        let mut t = ChunkTranscoder::with_chat_id("glm-4.7", "chatcmpl-a");
        let LineOutcome::Event(bytes) =
            t.process_line(r#"data:{"choices":[{"delta":{"content":"hi"}}]}"#)
        else {
            panic!("expected an event");
        };
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));

        let chunk = event_json(text.trim_end());
        assert_eq!(chunk["id"], "chatcmpl-a");
        assert_eq!(chunk["model"], "glm-4.7");
        assert_eq!(chunk["choices"][0]["delta"]["content"], "hi");
    }

    #[test]
    fn test_finish_only_once() {
        let mut t = ChunkTranscoder::new("m");
        assert!(t.chat_id().starts_with("chatcmpl-"));
        assert_eq!(t.finish(), Some(Bytes::from_static(DONE_EVENT.as_bytes())));
        assert_eq!(t.finish(), None);
    }

    #[tokio::test]
    async fn test_chunks_then_done_yield_one_terminator() {
        let body = stream::iter(ok_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ]));
        let events = collect_events(body).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[3], "data: [DONE]");
        assert_eq!(events.iter().filter(|e| *e == "data: [DONE]").count(), 1);

        let ids: Vec<Value> = events[..3].iter().map(|e| event_json(e)["id"].clone()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(event_json(&events[0])["choices"][0]["delta"]["content"], "a");
        assert_eq!(event_json(&events[2])["choices"][0]["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn test_lines_after_done_are_ignored() {
        let body = stream::iter(ok_chunks(&[
            "data: {\"choices\":[]}\n\ndata: [DONE]\n\ndata: {\"choices\":[]}\n\n",
        ]));
        let events = collect_events(body).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], "data: [DONE]");
    }

    #[tokio::test]
    async fn test_missing_done_still_terminates() {
        let body = stream::iter(ok_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
        ]));
        let events = collect_events(body).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], "data: [DONE]");
    }

    #[tokio::test]
    async fn test_read_error_still_terminates() {
        let body = stream::iter(vec![
            Ok(Bytes::from("data: {\"choices\":[]}\n\n")),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from("data: {\"choices\":[]}\n\n")),
        ]);
        let events = collect_events(body).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], "data: [DONE]");
    }

    #[tokio::test]
    async fn test_malformed_chunk_skipped_not_fatal() {
        let body = stream::iter(ok_chunks(&[
            "data: {\"choices\":[]}\n\n",
            "data: {oops\n\n",
            "data: {\"choices\":[]}\n\n",
            "data: [DONE]\n\n",
        ]));
        let events = collect_events(body).await;
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        // Multi-byte character split between two network reads
        let full = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n\n".as_bytes();
        let split = full.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let body = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(&full[..split])),
            Ok(Bytes::copy_from_slice(&full[split..])),
            Ok(Bytes::from("data: [DONE]")),
        ]);
        let events = collect_events(body).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            event_json(&events[0])["choices"][0]["delta"]["content"],
            "héllo"
        );
        assert_eq!(events[1], "data: [DONE]");
    }

    #[tokio::test]
    async fn test_crlf_framing() {
        let body = stream::iter(ok_chunks(&[
            "data: {\"choices\":[]}\r\n\r\ndata: [DONE]\r\n\r\n",
        ]));
        let events = collect_events(body).await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_upstream_yields_only_terminator() {
        let body = stream::iter(Vec::<Result<Bytes, std::io::Error>>::new());
        let events = collect_events(body).await;
        assert_eq!(events, vec!["data: [DONE]".to_string()]);
    }

    #[tokio::test]
    async fn test_oversized_line_ends_stream_with_terminator() {
        let oversized = format!("data: {}", "a".repeat(MAX_BUFFERED_BYTES + 1));
        let body = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from("data: {\"choices\":[]}\n\n")),
            Ok(Bytes::from(oversized)),
            Ok(Bytes::from("\n\ndata: {\"choices\":[]}\n\n")),
        ]);
        let events = collect_events(body).await;
        assert_eq!(events.len(), 2);
        assert_eq!(event_json(&events[0])["object"], "chat.completion.chunk");
        assert_eq!(events[1], "data: [DONE]");
    }
}
