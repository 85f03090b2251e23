//! Mock inference backends for deterministic testing.
//!
//! [`MockEncoder`] produces deterministic embeddings from input text, and
//! [`MockChatModel`] replays scripted completion/stream rounds, so retrieval
//! and dialogue-loop behavior can be tested without live services.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use curio_core::{
    ChatBackend, ChatCompletion, ChatRequest, DeltaStream, EncodeInput, EncodeMode, Encoder,
    Error, Result, StreamDelta, Vector,
};

/// Deterministic mock encoder.
///
/// The same input always yields the same unit vector; an `unavailable`
/// encoder returns `None` for every input, mirroring the missing-credentials
/// degraded mode of the real client.
#[derive(Clone)]
pub struct MockEncoder {
    dimension: usize,
    available: bool,
    calls: Arc<Mutex<Vec<(usize, EncodeMode)>>>,
}

impl MockEncoder {
    /// Create a mock encoder with the given vector width.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            available: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Simulate a missing-credentials encoder: every input encodes to `None`.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Batch sizes and modes of every `encode` call so far.
    pub fn calls(&self) -> Vec<(usize, EncodeMode)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `encode` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The vector this encoder would produce for `text`, for assertions.
    pub fn vector_for(&self, text: &str) -> Vector {
        Vector::from(deterministic_embedding(text, self.dimension))
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    async fn encode(&self, inputs: &[EncodeInput], mode: EncodeMode) -> Vec<Option<Vector>> {
        self.calls.lock().unwrap().push((inputs.len(), mode));
        if !self.available {
            return vec![None; inputs.len()];
        }
        inputs
            .iter()
            .map(|input| {
                let mut key = input.text.clone().unwrap_or_default();
                if let Some(url) = &input.image_url {
                    key.push('\n');
                    key.push_str(url);
                }
                Some(Vector::from(deterministic_embedding(&key, self.dimension)))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Generate a deterministic unit vector from text via character hashing.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    for (i, c) in text.chars().enumerate() {
        let idx = (c as usize + i) % dimension;
        vec[idx] += 0.1;
    }
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
    vec
}

/// A deterministic unit vector concentrated on one axis, for tests that need
/// well-separated embeddings.
pub fn axis_embedding(axis: usize, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    vec[axis % dimension] = 1.0;
    vec
}

/// One scripted round of the mock chat model.
enum ScriptedRound {
    Completion(Result<ChatCompletion>),
    Stream(Vec<Result<StreamDelta>>),
}

/// Scripted mock chat model.
///
/// `complete` and `stream` each consume their own queue of scripted rounds in
/// order; an exhausted queue is an error, which keeps tests from silently
/// looping forever.
#[derive(Clone, Default)]
pub struct MockChatModel {
    completions: Arc<Mutex<VecDeque<ScriptedRound>>>,
    streams: Arc<Mutex<VecDeque<ScriptedRound>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    stream_calls: Arc<Mutex<usize>>,
}

impl MockChatModel {
    /// Create a mock with empty scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a non-streaming round answering with plain text.
    pub fn with_answer(self, text: impl Into<String>) -> Self {
        self.completions
            .lock()
            .unwrap()
            .push_back(ScriptedRound::Completion(Ok(ChatCompletion {
                content: text.into(),
                tool_calls: Vec::new(),
            })));
        self
    }

    /// Script a non-streaming round that requests tool calls.
    pub fn with_tool_round(self, calls: Vec<curio_core::ToolCall>) -> Self {
        self.with_tool_round_and_text("", calls)
    }

    /// Script a non-streaming round that requests tool calls alongside
    /// commentary text.
    pub fn with_tool_round_and_text(
        self,
        text: impl Into<String>,
        calls: Vec<curio_core::ToolCall>,
    ) -> Self {
        self.completions
            .lock()
            .unwrap()
            .push_back(ScriptedRound::Completion(Ok(ChatCompletion {
                content: text.into(),
                tool_calls: calls,
            })));
        self
    }

    /// Script a non-streaming round that fails.
    pub fn with_completion_error(self, message: impl Into<String>) -> Self {
        self.completions
            .lock()
            .unwrap()
            .push_back(ScriptedRound::Completion(Err(Error::ChatModel(
                message.into(),
            ))));
        self
    }

    /// Script a streamed round from a fixed delta sequence.
    pub fn with_stream(self, deltas: Vec<StreamDelta>) -> Self {
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedRound::Stream(deltas.into_iter().map(Ok).collect()));
        self
    }

    /// Script a streamed round of plain text chunks.
    pub fn with_streamed_text(self, chunks: &[&str]) -> Self {
        self.with_stream(
            chunks
                .iter()
                .map(|c| StreamDelta::Text(c.to_string()))
                .collect(),
        )
    }

    /// Every request received, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of non-streaming completion calls so far.
    pub fn completion_call_count(&self) -> usize {
        self.requests.lock().unwrap().len() - self.stream_call_count()
    }

    /// Number of streaming calls so far.
    pub fn stream_call_count(&self) -> usize {
        *self.stream_calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatBackend for MockChatModel {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion> {
        self.requests.lock().unwrap().push(req.clone());
        match self.completions.lock().unwrap().pop_front() {
            Some(ScriptedRound::Completion(result)) => result,
            Some(ScriptedRound::Stream(_)) | None => Err(Error::ChatModel(
                "Mock completion script exhausted".into(),
            )),
        }
    }

    async fn stream(&self, req: &ChatRequest) -> Result<DeltaStream> {
        self.requests.lock().unwrap().push(req.clone());
        *self.stream_calls.lock().unwrap() += 1;
        match self.streams.lock().unwrap().pop_front() {
            Some(ScriptedRound::Stream(deltas)) => Ok(Box::pin(stream::iter(deltas))),
            Some(ScriptedRound::Completion(_)) | None => {
                Err(Error::ChatModel("Mock stream script exhausted".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_encoder_deterministic() {
        let enc = MockEncoder::new(64);
        let a = enc.encode(&[EncodeInput::text("same")], EncodeMode::Document).await;
        let b = enc.encode(&[EncodeInput::text("same")], EncodeMode::Document).await;
        assert_eq!(a[0].as_ref().unwrap().as_slice(), b[0].as_ref().unwrap().as_slice());
    }

    #[tokio::test]
    async fn test_mock_encoder_unavailable_returns_none() {
        let enc = MockEncoder::new(64).unavailable();
        let out = enc.encode(&[EncodeInput::text("x")], EncodeMode::Query).await;
        assert_eq!(out, vec![None]);
        assert_eq!(enc.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_encoder_image_changes_vector() {
        let enc = MockEncoder::new(64);
        let plain = enc
            .encode(&[EncodeInput::text("photo")], EncodeMode::Document)
            .await;
        let with_image = enc
            .encode(
                &[EncodeInput::text("photo").with_image("https://a.example/p.png")],
                EncodeMode::Document,
            )
            .await;
        assert_ne!(
            plain[0].as_ref().unwrap().as_slice(),
            with_image[0].as_ref().unwrap().as_slice()
        );
    }

    #[test]
    fn test_deterministic_embedding_is_unit_length() {
        let v = deterministic_embedding("anything", 32);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_chat_replays_script_in_order() {
        let chat = MockChatModel::new()
            .with_tool_round(vec![curio_core::ToolCall {
                id: "c1".into(),
                name: "search_items".into(),
                arguments: serde_json::json!({"query": "x"}),
            }])
            .with_answer("done");

        let req = ChatRequest {
            system: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        };
        let first = chat.complete(&req).await.unwrap();
        assert!(first.has_tool_calls());
        let second = chat.complete(&req).await.unwrap();
        assert_eq!(second.content, "done");
        assert!(chat.complete(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_chat_streams_deltas() {
        let chat = MockChatModel::new().with_streamed_text(&["a", "b"]);
        let req = ChatRequest {
            system: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        };
        let deltas: Vec<_> = chat.stream(&req).await.unwrap().collect().await;
        assert_eq!(deltas.len(), 2);
        assert_eq!(chat.stream_call_count(), 1);
    }
}
