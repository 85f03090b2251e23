//! SSE parsing for streamed chat responses.
//!
//! Converts the provider's chunked event stream into [`StreamDelta`] values:
//! text deltas as they arrive, plus tool calls reassembled from their
//! argument fragments. Providers may emit a tool call *after* partial text in
//! the same round, so a `ToolCall` delta can appear at any position; the
//! dialogue loop's buffering stage handles the retraction.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use curio_core::{DeltaStream, Error, Result, StreamDelta, ToolCall};

/// Parse an SSE byte stream into a stream of deltas.
pub fn parse_delta_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> DeltaStream {
    let state = (Box::pin(byte_stream), SseParser::default(), false);
    let deltas = stream::unfold(state, |(mut bytes, mut parser, finished)| async move {
        if finished {
            return None;
        }
        match bytes.next().await {
            Some(Ok(chunk)) => {
                let out = parser.feed(&chunk);
                Some((out, (bytes, parser, false)))
            }
            Some(Err(e)) => {
                let out = vec![Err(Error::ChatModel(format!("Stream error: {}", e)))];
                Some((out, (bytes, parser, true)))
            }
            // Provider closed without [DONE]; flush whatever accumulated.
            None => Some((parser.flush_tool_calls(), (bytes, parser, true))),
        }
    })
    .map(stream::iter)
    .flatten();

    Box::pin(deltas)
}

/// Incremental SSE parser. Buffers partial lines across chunk boundaries and
/// reassembles tool calls from their streamed fragments.
#[derive(Default)]
struct SseParser {
    line_buf: String,
    pending_tools: BTreeMap<usize, ToolCallDraft>,
}

#[derive(Default)]
struct ToolCallDraft {
    id: String,
    name: String,
    arguments: String,
}

impl SseParser {
    /// Consume one transport chunk, returning any deltas it completes.
    fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamDelta>> {
        self.line_buf.push_str(&String::from_utf8_lossy(chunk));

        let mut out = Vec::new();
        while let Some(newline) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=newline).collect();
            out.extend(self.parse_line(line.trim()));
        }
        out
    }

    fn parse_line(&mut self, line: &str) -> Vec<Result<StreamDelta>> {
        if line.is_empty() || line.starts_with(':') {
            return Vec::new();
        }
        let Some(data) = line.strip_prefix("data: ") else {
            return Vec::new();
        };
        if data == "[DONE]" {
            return self.flush_tool_calls();
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                return vec![Err(Error::ChatModel(format!(
                    "Failed to parse SSE chunk: {}",
                    e
                )))]
            }
        };

        let mut out = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    out.push(Ok(StreamDelta::Text(text)));
                }
            }
            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                let draft = self.pending_tools.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    draft.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        draft.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        draft.arguments.push_str(&arguments);
                    }
                }
            }
            // A terminal tool_calls round has all fragments; emit them now
            // rather than waiting for [DONE].
            if choice.finish_reason.as_deref() == Some("tool_calls") {
                out.extend(self.flush_tool_calls());
            }
        }
        out
    }

    /// Emit all fully-accumulated tool calls and clear the pending set.
    fn flush_tool_calls(&mut self) -> Vec<Result<StreamDelta>> {
        std::mem::take(&mut self.pending_tools)
            .into_values()
            .filter(|draft| !draft.name.is_empty())
            .map(|draft| {
                let arguments =
                    serde_json::from_str(&draft.arguments).unwrap_or(JsonValue::Null);
                Ok(StreamDelta::ToolCall(ToolCall {
                    id: draft.id,
                    name: draft.name,
                    arguments,
                }))
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDeltaBody,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDeltaBody {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Deserialize)]
struct ToolCallFragment {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut SseParser, chunks: &[&str]) -> Vec<Result<StreamDelta>> {
        chunks
            .iter()
            .flat_map(|c| parser.feed(c.as_bytes()))
            .collect()
    }

    fn texts(deltas: &[Result<StreamDelta>]) -> String {
        deltas
            .iter()
            .filter_map(|d| match d {
                Ok(StreamDelta::Text(t)) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn tool_calls(deltas: Vec<Result<StreamDelta>>) -> Vec<ToolCall> {
        deltas
            .into_iter()
            .filter_map(|d| match d {
                Ok(StreamDelta::ToolCall(tc)) => Some(tc),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_text_deltas_in_order() {
        let mut parser = SseParser::default();
        let deltas = feed_all(
            &mut parser,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
        );
        assert_eq!(texts(&deltas), "Hello");
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut parser = SseParser::default();
        let deltas = feed_all(
            &mut parser,
            &[
                "data: {\"choices\":[{\"delta\":{\"con",
                "tent\":\"Hi\"}}]}\n\n",
            ],
        );
        assert_eq!(texts(&deltas), "Hi");
    }

    #[test]
    fn test_tool_call_reassembled_from_fragments() {
        let mut parser = SseParser::default();
        let deltas = feed_all(
            &mut parser,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"search_items\",\"arguments\":\"\"}}]}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"query\\\":\"}}]}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"rust\\\"}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n\n",
            ],
        );
        let calls = tool_calls(deltas);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "search_items");
        assert_eq!(calls[0].arguments["query"], "rust");
    }

    #[test]
    fn test_trailing_tool_call_after_text() {
        // Providers can emit a tool call after partial text in one round.
        let mut parser = SseParser::default();
        let deltas = feed_all(
            &mut parser,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Let me check\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c\",\"function\":{\"name\":\"search_items\",\"arguments\":\"{}\"}}]}}]}\n\n",
                "data: [DONE]\n\n",
            ],
        );
        assert_eq!(texts(&deltas), "Let me check");
        assert_eq!(tool_calls(deltas).len(), 1);
    }

    #[test]
    fn test_done_without_pending_tools_emits_nothing() {
        let mut parser = SseParser::default();
        let deltas = feed_all(&mut parser, &["data: [DONE]\n\n"]);
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_comment_and_blank_lines_skipped() {
        let mut parser = SseParser::default();
        let deltas = feed_all(&mut parser, &[": keepalive\n\n", "\n"]);
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_invalid_json_yields_error_delta() {
        let mut parser = SseParser::default();
        let deltas = feed_all(&mut parser, &["data: {not json}\n\n"]);
        assert_eq!(deltas.len(), 1);
        assert!(deltas[0].is_err());
    }

    #[test]
    fn test_multiple_tool_calls_keep_index_order() {
        let mut parser = SseParser::default();
        let deltas = feed_all(
            &mut parser,
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"c2\",\"function\":{\"name\":\"find_similar_items\",\"arguments\":\"{}\"}}]}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"search_items\",\"arguments\":\"{}\"}}]}}]}\n\n",
                "data: [DONE]\n\n",
            ],
        );
        let calls = tool_calls(deltas);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[1].id, "c2");
    }

    #[tokio::test]
    async fn test_stream_end_without_done_flushes_tools() {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = vec![Ok(Bytes::from(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c\",\"function\":{\"name\":\"search_items\",\"arguments\":\"{}\"}}]}}]}\n\n",
        ))];
        let stream = parse_delta_stream(stream::iter(chunks));
        let deltas: Vec<_> = stream.collect().await;
        assert_eq!(tool_calls(deltas).len(), 1);
    }
}
