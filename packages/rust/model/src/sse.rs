//! Server-sent event parsing for OpenAI-compatible streaming completions.
//!
//! The body arrives as arbitrary byte chunks; lines are reassembled across
//! chunk boundaries before `data:` payloads are decoded.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::{StreamEvent, ToolCall};

const DONE_SENTINEL: &str = "[DONE]";

/// Upper bound on tool-call slots per response. Deltas with a larger index
/// end the stream with an error.
const MAX_TOOL_CALLS: usize = 128;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<DeltaToolCall>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    #[serde(default)]
    function: DeltaFunction,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub(crate) message: String,
}

// ---------------------------------------------------------------------------
// Parser state
// ---------------------------------------------------------------------------

struct SseState<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamEvent>,
    tool_calls: Vec<ToolCall>,
    tool_calls_emitted: bool,
    finished: bool,
}

impl<S> SseState<S> {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']));
            if self.finished {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            self.finish();
            return;
        }

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "skipping undecodable stream chunk");
                return;
            }
        };

        if let Some(error) = chunk.error {
            self.fail(error.message);
            return;
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.pending.push_back(StreamEvent::Answer(content));
            }
            for delta in choice.delta.tool_calls {
                if delta.index >= MAX_TOOL_CALLS {
                    self.fail(format!(
                        "tool call index {} exceeds limit of {MAX_TOOL_CALLS}",
                        delta.index
                    ));
                    return;
                }
                self.merge_tool_call(delta);
            }
            if choice.finish_reason.is_some() {
                self.emit_tool_calls();
            }
        }
    }

    fn merge_tool_call(&mut self, delta: DeltaToolCall) {
        if self.tool_calls.len() <= delta.index {
            self.tool_calls.resize_with(delta.index + 1, ToolCall::default);
        }
        let call = &mut self.tool_calls[delta.index];
        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(name) = delta.function.name {
            call.name.push_str(&name);
        }
        if let Some(arguments) = delta.function.arguments {
            call.arguments.push_str(&arguments);
        }
    }

    fn emit_tool_calls(&mut self) {
        if self.tool_calls_emitted || self.tool_calls.is_empty() {
            return;
        }
        self.tool_calls_emitted = true;
        for call in &self.tool_calls {
            self.pending.push_back(StreamEvent::ToolCall(call.clone()));
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.emit_tool_calls();
        self.pending.push_back(StreamEvent::Done {
            tool_calls: self.tool_calls.clone(),
        });
        self.finished = true;
    }

    fn fail(&mut self, message: String) {
        warn!(%message, "chat stream failed");
        self.pending.push_back(StreamEvent::Error(message));
        self.finished = true;
    }
}

/// Turn a raw SSE byte stream into [`StreamEvent`]s.
///
/// The output always ends with exactly one terminal event: `Done` on the
/// `[DONE]` sentinel or end of body, `Error` on a transport or API error.
pub fn sse_events<S, B, E>(body: S) -> BoxStream<'static, StreamEvent>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        tool_calls: Vec::new(),
        tool_calls_emitted: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => state.push_bytes(bytes.as_ref()),
                Some(Err(e)) => state.fail(format!("stream error: {e}")),
                None => {
                    if !state.buffer.is_empty() {
                        let rest = std::mem::take(&mut state.buffer);
                        state.handle_line(String::from_utf8_lossy(&rest).trim());
                    }
                    state.finish();
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    type Chunk = Result<&'static [u8], std::io::Error>;

    fn ok(text: &'static str) -> Chunk {
        Ok(text.as_bytes())
    }

    async fn collect(chunks: Vec<Chunk>) -> Vec<StreamEvent> {
        sse_events(stream::iter(chunks)).collect().await
    }

    #[tokio::test]
    async fn answer_fragments_then_done() {
        let events = collect(vec![
            ok("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"),
            ok("data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Answer("Hel".into()),
                StreamEvent::Answer("lo".into()),
                StreamEvent::Done { tool_calls: vec![] },
            ]
        );
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let events = collect(vec![
            ok("data: {\"choices\":[{\"del"),
            ok("ta\":{\"content\":\"split\"}}]}\r\n"),
            ok("\r\ndata: [DONE]\r\n"),
        ])
        .await;

        assert_eq!(events[0], StreamEvent::Answer("split".into()));
        assert!(matches!(events[1], StreamEvent::Done { .. }));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn tool_call_deltas_are_accumulated() {
        let events = collect(vec![
            ok(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search","arguments":"{\"q\":"}}]}}]}"#),
            ok("\n"),
            ok(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"faq\"}"}}]}}]}"#),
            ok("\n"),
            ok("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n"),
            ok("data: [DONE]\n"),
        ])
        .await;

        let expected = ToolCall {
            id: "call_1".into(),
            name: "search".into(),
            arguments: r#"{"q":"faq"}"#.into(),
        };
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCall(expected.clone()),
                StreamEvent::Done {
                    tool_calls: vec![expected]
                },
            ]
        );
    }

    #[tokio::test]
    async fn out_of_range_tool_call_index_ends_stream() {
        let events = collect(vec![
            ok("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"),
            ok(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":18446744073709551615,"function":{"name":"x"}}]}}]}"#),
            ok("\n"),
            ok(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":128,"function":{"name":"y"}}]}}]}"#),
            ok("\ndata: [DONE]\n"),
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Answer("a".into()));
        assert!(
            matches!(&events[1], StreamEvent::Error(m) if m.contains("18446744073709551615"))
        );
    }

    #[tokio::test]
    async fn largest_allowed_tool_call_index_is_accepted() {
        let events = collect(vec![
            ok(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":127,"id":"c","function":{"name":"last"}}]},"finish_reason":"tool_calls"}]}"#),
            ok("\ndata: [DONE]\n"),
        ])
        .await;

        let StreamEvent::Done { tool_calls } = events.last().unwrap() else {
            panic!("expected Done, got {events:?}");
        };
        assert_eq!(tool_calls.len(), 128);
        assert_eq!(tool_calls[127].name, "last");
    }

    #[tokio::test]
    async fn api_error_payload_ends_stream() {
        let events = collect(vec![
            ok("data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n"),
            ok("data: {\"error\":{\"message\":\"rate limited\"}}\n"),
            ok("data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Answer("par".into()),
                StreamEvent::Error("rate limited".into()),
            ]
        );
    }

    #[tokio::test]
    async fn transport_error_is_terminal() {
        let events = collect(vec![
            ok("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"),
            Err(std::io::Error::other("connection reset")),
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], StreamEvent::Error(m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn body_without_sentinel_still_finishes() {
        let events = collect(vec![ok(
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}",
        )])
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Answer("tail".into()),
                StreamEvent::Done { tool_calls: vec![] },
            ]
        );
    }
}
