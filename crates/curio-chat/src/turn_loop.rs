//! The tool-use dialogue loop.
//!
//! One user turn runs a bounded state machine against the chat model:
//! non-streaming rounds while tool calls are plausible, all requested tools
//! of a round executed concurrently, then a streamed final round. Streamed
//! text is buffered until the round is confirmed terminal — some providers
//! emit a tool call *after* partial text, and speculative text that might be
//! retracted is never shown to the caller.
//!
//! Every exit path — success, tool budget exhaustion, error — emits the
//! `done` frame exactly once and never writes after it.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{
    ChatBackend, ChatEvent, ChatMessage, ChatRequest, ContextRef, Result, SessionRepository,
    StreamDelta, ToolCall, TurnRepository, TurnRole,
};

use crate::memory::SessionMemory;
use crate::retriever::{ContextRetriever, RetrievedContext};
use crate::tools::ToolRegistry;

/// Base system instructions; retrieved grounding is appended per turn.
const SYSTEM_INSTRUCTIONS: &str = "You are an assistant for a personal collection of links, \
notes, images, files and documents. Answer from the provided context when it is relevant, \
and use the search tools to look up items you are not sure about. Be concise and mention \
which items informed your answer.";

/// Configuration for the dialogue loop.
#[derive(Debug, Clone)]
pub struct TurnLoopConfig {
    /// Hard bound on tool-call rounds within one turn.
    pub max_tool_rounds: usize,
    /// Number of prior turns replayed into the model context.
    pub turn_window: i64,
}

impl Default for TurnLoopConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: defaults::MAX_TOOL_ROUNDS,
            turn_window: defaults::TURN_WINDOW,
        }
    }
}

impl TurnLoopConfig {
    /// Set the tool-round bound.
    pub fn with_max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max;
        self
    }

    /// Set the prior-turn window.
    pub fn with_turn_window(mut self, window: i64) -> Self {
        self.turn_window = window;
        self
    }
}

/// Outcome of consuming one streamed round.
struct StreamedRound {
    chunks: Vec<String>,
    tool_calls: Vec<ToolCall>,
}

/// The conversational state machine for one workspace.
pub struct TurnLoop {
    chat: Arc<dyn ChatBackend>,
    retriever: ContextRetriever,
    memory: SessionMemory,
    tools: ToolRegistry,
    sessions: Arc<dyn SessionRepository>,
    turns: Arc<dyn TurnRepository>,
    config: TurnLoopConfig,
}

impl TurnLoop {
    /// Create a dialogue loop over the given backends.
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        retriever: ContextRetriever,
        memory: SessionMemory,
        tools: ToolRegistry,
        sessions: Arc<dyn SessionRepository>,
        turns: Arc<dyn TurnRepository>,
    ) -> Self {
        Self {
            chat,
            retriever,
            memory,
            tools,
            sessions,
            turns,
            config: TurnLoopConfig::default(),
        }
    }

    /// Replace the default configuration.
    pub fn with_config(mut self, config: TurnLoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one user turn, emitting event frames on `tx`.
    ///
    /// The `done` frame is always the last write, on every exit path.
    #[instrument(skip(self, user_message, tx), fields(subsystem = "chat", component = "turn_loop", op = "run_turn", workspace_id = %workspace_id, session_id = %session_id))]
    pub async fn run_turn(
        &self,
        workspace_id: Uuid,
        session_id: Uuid,
        user_message: &str,
        tx: mpsc::Sender<ChatEvent>,
    ) {
        if let Err(e) = self
            .run_inner(workspace_id, session_id, user_message, &tx)
            .await
        {
            warn!(error = %e, "Turn failed");
            emit(&tx, ChatEvent::Error {
                message: e.to_string(),
            })
            .await;
        }
        emit(&tx, ChatEvent::Done).await;
    }

    async fn run_inner(
        &self,
        workspace_id: Uuid,
        session_id: Uuid,
        user_message: &str,
        tx: &mpsc::Sender<ChatEvent>,
    ) -> Result<()> {
        // Window is fetched before the current message is written, so the
        // prompt never carries the user message twice.
        let prior_turns = self
            .turns
            .recent(session_id, self.config.turn_window)
            .await?;

        // The loop owns turn rows and utterance appends. These are side
        // effects of an already-started turn: log failures, do not abort.
        if let Err(e) = self
            .turns
            .insert(session_id, TurnRole::User, user_message)
            .await
        {
            warn!(error = %e, "Failed to persist user turn");
        }
        if let Err(e) = self.memory.append_utterance(session_id, user_message).await {
            warn!(error = %e, "Failed to append utterance");
        }

        let context = self.retriever.retrieve(workspace_id, user_message).await;

        // Side channel: let a visualization layer light up the grounding set
        // before any model latency.
        if !context.candidates.is_empty() {
            emit(tx, ChatEvent::Context {
                items: context
                    .candidates
                    .iter()
                    .map(|c| ContextRef {
                        item_id: c.item_id,
                        score: c.fused_score,
                    })
                    .collect(),
            })
            .await;
        }

        let mut request = self.seed_request(&prior_turns, user_message, &context);

        // Text the model produced alongside tool calls; streamed on budget
        // exhaustion so a forced termination still shows what exists.
        let mut partial_text = String::new();
        let mut tool_rounds = 0usize;

        let final_text = loop {
            if tool_rounds >= self.config.max_tool_rounds {
                info!(
                    tool_rounds,
                    "Tool budget exhausted, terminating with partial text"
                );
                emit(tx, ChatEvent::Status {
                    message: "Tool budget exhausted".to_string(),
                })
                .await;
                if !partial_text.is_empty() {
                    emit(tx, ChatEvent::Text {
                        delta: partial_text.clone(),
                    })
                    .await;
                }
                break partial_text;
            }

            let completion = self.chat.complete(&request).await?;

            if completion.has_tool_calls() {
                tool_rounds += 1;
                if !completion.content.is_empty() {
                    partial_text.push_str(&completion.content);
                }
                self.run_tool_round(workspace_id, &mut request, completion.tool_calls, tx)
                    .await;
                continue;
            }

            // No tool calls on the full response: stream the same round for
            // the caller. The buffer commits only once the streamed round
            // proves terminal too.
            let streamed = self.consume_stream(&request).await?;
            if streamed.tool_calls.is_empty() {
                for chunk in &streamed.chunks {
                    emit(tx, ChatEvent::Text {
                        delta: chunk.clone(),
                    })
                    .await;
                }
                break streamed.chunks.concat();
            }

            // The streamed round still produced a tool call after partial
            // text. Discard the buffered text and keep looping.
            debug!(
                discarded_chars = streamed.chunks.iter().map(String::len).sum::<usize>(),
                "Streamed round carried a trailing tool call, retracting buffered text"
            );
            tool_rounds += 1;
            self.run_tool_round(workspace_id, &mut request, streamed.tool_calls, tx)
                .await;
        };

        self.finish_turn(session_id, &final_text).await;
        Ok(())
    }

    /// Seed the model context: system instructions plus grounding, the prior
    /// turn window, and the current message with its grounding images.
    fn seed_request(
        &self,
        prior_turns: &[curio_core::Turn],
        user_message: &str,
        context: &RetrievedContext,
    ) -> ChatRequest {
        let system = if context.text.is_empty() {
            SYSTEM_INSTRUCTIONS.to_string()
        } else {
            format!("{}\n\n{}", SYSTEM_INSTRUCTIONS, context.text)
        };

        let mut messages: Vec<ChatMessage> = prior_turns
            .iter()
            .map(|turn| match turn.role {
                TurnRole::User => ChatMessage::user(&turn.content),
                TurnRole::Assistant => ChatMessage::assistant(&turn.content),
            })
            .collect();
        messages.push(ChatMessage::user_with_images(user_message, &context.images));

        ChatRequest {
            system,
            messages,
            tools: ToolRegistry::definitions(),
        }
    }

    /// Execute all tool calls of one round concurrently and append their
    /// results to the model context.
    async fn run_tool_round(
        &self,
        workspace_id: Uuid,
        request: &mut ChatRequest,
        calls: Vec<ToolCall>,
        tx: &mpsc::Sender<ChatEvent>,
    ) {
        for call in &calls {
            emit(tx, ChatEvent::Status {
                message: format!("Searching with {}", call.name),
            })
            .await;
        }

        let results = futures::future::join_all(
            calls
                .iter()
                .map(|call| self.tools.execute(workspace_id, call)),
        )
        .await;

        request
            .messages
            .push(ChatMessage::assistant_tool_calls(calls.clone()));
        for (call, result) in calls.iter().zip(results) {
            request
                .messages
                .push(ChatMessage::tool_result(&call.id, result));
        }
    }

    /// Drain one streamed round into its text chunks and any tool calls.
    async fn consume_stream(&self, request: &ChatRequest) -> Result<StreamedRound> {
        let mut stream = self.chat.stream(request).await?;
        let mut chunks = Vec::new();
        let mut tool_calls = Vec::new();
        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::Text(text) => chunks.push(text),
                StreamDelta::ToolCall(call) => tool_calls.push(call),
            }
        }
        Ok(StreamedRound { chunks, tool_calls })
    }

    /// Persist the assistant turn and refresh session memory. All of this is
    /// best-effort enrichment of an answer the caller already has.
    async fn finish_turn(&self, session_id: Uuid, final_text: &str) {
        if final_text.is_empty() {
            debug!("No text produced, skipping assistant turn persistence");
            return;
        }
        if let Err(e) = self
            .turns
            .insert(session_id, TurnRole::Assistant, final_text)
            .await
        {
            warn!(error = %e, "Failed to persist assistant turn");
        }
        if let Err(e) = self.sessions.touch(session_id).await {
            warn!(error = %e, "Failed to touch session");
        }
        self.memory.reembed_best_effort(session_id).await;
    }
}

/// Send one frame, silently dropping it if the caller has disconnected.
/// In-flight model and tool work is not canceled on disconnect; it simply
/// stops being observable.
async fn emit(tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    if tx.is_closed() {
        return;
    }
    let _ = tx.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ranker_over, seed_embedded_item};
    use curio_core::testing::{
        MemoryItemRepository, MemorySessionRepository, MemoryTurnRepository,
    };
    use curio_core::ItemRepository;
    use curio_inference::{MockChatModel, MockEncoder};
    use serde_json::json;

    const DIM: usize = 16;

    struct Fixture {
        items: Arc<MemoryItemRepository>,
        sessions: Arc<MemorySessionRepository>,
        turns: Arc<MemoryTurnRepository>,
        encoder: MockEncoder,
        workspace_id: Uuid,
        session_id: Uuid,
    }

    impl Fixture {
        async fn new(encoder: MockEncoder) -> Self {
            let items = Arc::new(MemoryItemRepository::new());
            let sessions = Arc::new(MemorySessionRepository::new());
            let turns = Arc::new(MemoryTurnRepository::new());
            let workspace_id = Uuid::new_v4();
            let session_id = sessions.create(workspace_id, "test chat").await.unwrap();
            Self {
                items,
                sessions,
                turns,
                encoder,
                workspace_id,
                session_id,
            }
        }

        fn turn_loop(&self, chat: MockChatModel, config: TurnLoopConfig) -> TurnLoop {
            let encoder: Arc<dyn curio_core::Encoder> = Arc::new(self.encoder.clone());
            let ranker = Arc::new(ranker_over(self.items.clone()));
            TurnLoop::new(
                Arc::new(chat),
                ContextRetriever::new(
                    encoder.clone(),
                    ranker.clone(),
                    self.items.clone(),
                    self.sessions.clone(),
                ),
                SessionMemory::new(self.sessions.clone(), encoder.clone()),
                ToolRegistry::new(encoder, ranker),
                self.sessions.clone(),
                self.turns.clone(),
            )
            .with_config(config)
        }

        async fn run(&self, chat: MockChatModel, config: TurnLoopConfig, message: &str) -> Vec<ChatEvent> {
            let (tx, mut rx) = mpsc::channel(defaults::CHAT_CHANNEL_CAPACITY);
            let loop_ = self.turn_loop(chat, config);
            loop_
                .run_turn(self.workspace_id, self.session_id, message, tx)
                .await;
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        }
    }

    fn text_of(events: &[ChatEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Text { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    fn done_count(events: &[ChatEvent]) -> usize {
        events.iter().filter(|e| matches!(e, ChatEvent::Done)).count()
    }

    fn tool_call(name: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: json!({"query": "anything"}),
        }
    }

    #[tokio::test]
    async fn test_plain_answer_streams_and_persists_one_turn() {
        let encoder = MockEncoder::new(DIM);
        let fx = Fixture::new(encoder.clone()).await;
        seed_embedded_item(&fx.items, fx.workspace_id, "Intro to pgvector",
            "vector search in postgres", encoder.vector_for("vector search")).await;

        let chat = MockChatModel::new()
            .with_answer("prelude")
            .with_streamed_text(&["pgvector ", "handles that."]);
        let events = fx.run(chat, TurnLoopConfig::default(), "vector search").await;

        assert_eq!(text_of(&events), "pgvector handles that.");
        assert_eq!(done_count(&events), 1);
        assert!(matches!(events.last(), Some(ChatEvent::Done)));

        // Context frame precedes everything else.
        assert!(matches!(events.first(), Some(ChatEvent::Context { .. })));

        // One user turn plus one assistant turn, and the utterance recorded.
        let turns = fx.turns.all();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].role, TurnRole::Assistant);
        assert_eq!(turns[1].content, "pgvector handles that.");
        let session = fx.sessions.fetch(fx.session_id).await.unwrap();
        assert_eq!(session.user_utterances, vec!["vector search".to_string()]);
        // The completed turn triggered a session re-embed.
        assert!(session.embedding.is_some());
    }

    #[tokio::test]
    async fn test_grounding_lands_in_system_prompt() {
        let encoder = MockEncoder::new(DIM);
        let fx = Fixture::new(encoder.clone()).await;
        seed_embedded_item(&fx.items, fx.workspace_id, "Intro to pgvector",
            "vector search in postgres", encoder.vector_for("vector search")).await;

        let chat = MockChatModel::new()
            .with_answer("x")
            .with_streamed_text(&["answer"]);
        fx.run(chat.clone(), TurnLoopConfig::default(), "vector search").await;

        let requests = chat.requests();
        assert!(requests[0].system.contains("Intro to pgvector"));
        assert!(!requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_executes_and_feeds_results_back() {
        let encoder = MockEncoder::new(DIM);
        let fx = Fixture::new(encoder.clone()).await;
        seed_embedded_item(&fx.items, fx.workspace_id, "Rust notes", "borrow checker",
            encoder.vector_for("anything")).await;

        let chat = MockChatModel::new()
            .with_tool_round(vec![tool_call("search_items")])
            .with_answer("terminal")
            .with_streamed_text(&["Found your Rust notes."]);
        let events = fx.run(chat.clone(), TurnLoopConfig::default(), "rust?").await;

        assert_eq!(text_of(&events), "Found your Rust notes.");
        // A status frame named the tool.
        assert!(events.iter().any(|e| matches!(
            e,
            ChatEvent::Status { message } if message.contains("search_items")
        )));

        // The second completion request carried the tool result message.
        let second = &chat.requests()[1];
        let tool_msg = second
            .messages
            .iter()
            .find(|m| m.tool_call_id.is_some())
            .unwrap();
        assert!(tool_msg.text().contains("Rust notes"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result_not_abort() {
        let fx = Fixture::new(MockEncoder::new(DIM)).await;

        let chat = MockChatModel::new()
            .with_tool_round(vec![tool_call("not_a_tool")])
            .with_answer("terminal")
            .with_streamed_text(&["Recovered."]);
        let events = fx.run(chat.clone(), TurnLoopConfig::default(), "hi").await;

        assert_eq!(text_of(&events), "Recovered.");
        let second = &chat.requests()[1];
        let tool_msg = second
            .messages
            .iter()
            .find(|m| m.tool_call_id.is_some())
            .unwrap();
        assert!(tool_msg.text().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_terminates_with_partial_text() {
        let fx = Fixture::new(MockEncoder::new(DIM)).await;

        // The model requests a tool call on every round; commentary arrives
        // alongside the first round's calls.
        let chat = MockChatModel::new()
            .with_tool_round_and_text("Partial progress so far.", vec![tool_call("search_items")])
            .with_tool_round(vec![tool_call("search_items")])
            .with_tool_round(vec![tool_call("search_items")]);

        let events = fx
            .run(chat, TurnLoopConfig::default().with_max_tool_rounds(3), "hi")
            .await;

        assert_eq!(done_count(&events), 1);
        assert!(matches!(events.last(), Some(ChatEvent::Done)));
        assert!(events.iter().any(|e| matches!(
            e,
            ChatEvent::Status { message } if message.contains("budget")
        )));
        // Whatever partial text exists is still streamed and persisted.
        assert_eq!(text_of(&events), "Partial progress so far.");
        let turns = fx.turns.all();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "Partial progress so far.");
    }

    #[tokio::test]
    async fn test_trailing_tool_call_retracts_buffered_text() {
        let encoder = MockEncoder::new(DIM);
        let fx = Fixture::new(encoder.clone()).await;
        seed_embedded_item(&fx.items, fx.workspace_id, "Target", "content",
            encoder.vector_for("anything")).await;

        let chat = MockChatModel::new()
            // Non-streaming probe sees a terminal round...
            .with_answer("speculative")
            // ...but the streamed replay produces text then a tool call.
            .with_stream(vec![
                StreamDelta::Text("This text must never surface".to_string()),
                StreamDelta::ToolCall(tool_call("search_items")),
            ])
            .with_answer("now terminal")
            .with_streamed_text(&["Clean final answer."]);

        let events = fx.run(chat, TurnLoopConfig::default(), "hi").await;

        let text = text_of(&events);
        assert_eq!(text, "Clean final answer.");
        assert!(!text.contains("never surface"));
        assert_eq!(done_count(&events), 1);

        let turns = fx.turns.all();
        assert_eq!(turns.last().unwrap().content, "Clean final answer.");
    }

    #[tokio::test]
    async fn test_model_failure_emits_error_then_done() {
        let fx = Fixture::new(MockEncoder::new(DIM)).await;

        let chat = MockChatModel::new().with_completion_error("provider melted");
        let events = fx.run(chat, TurnLoopConfig::default(), "hi").await;

        assert_eq!(events.iter().filter(|e| matches!(e, ChatEvent::Error { .. })).count(), 1);
        assert_eq!(done_count(&events), 1);
        assert!(matches!(events.last(), Some(ChatEvent::Done)));
        // The failed turn persisted no assistant text.
        assert_eq!(fx.turns.all().len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_encoder_still_answers_with_recent_context() {
        let fx = Fixture::new(MockEncoder::new(DIM).unavailable()).await;
        fx.items
            .insert(
                fx.workspace_id,
                curio_core::CreateItemRequest {
                    kind: curio_core::ItemKind::Note,
                    title: "Latest note".to_string(),
                    body: Some("body".to_string()),
                    tags: Vec::new(),
                    metadata: json!({}),
                },
            )
            .await
            .unwrap();

        let chat = MockChatModel::new()
            .with_answer("x")
            .with_streamed_text(&["Answer without vectors."]);
        let events = fx.run(chat.clone(), TurnLoopConfig::default(), "hi").await;

        // No context frame: recency fallback has no ranking.
        assert!(!events.iter().any(|e| matches!(e, ChatEvent::Context { .. })));
        assert_eq!(text_of(&events), "Answer without vectors.");
        assert!(chat.requests()[0].system.contains("Recent items"));
    }

    #[tokio::test]
    async fn test_prior_turns_replayed_within_window() {
        let fx = Fixture::new(MockEncoder::new(DIM)).await;
        for i in 0..4 {
            fx.turns
                .insert(fx.session_id, TurnRole::User, &format!("old {}", i))
                .await
                .unwrap();
        }

        let chat = MockChatModel::new()
            .with_answer("x")
            .with_streamed_text(&["ok"]);
        fx.run(
            chat.clone(),
            TurnLoopConfig::default().with_turn_window(2),
            "current",
        )
        .await;

        let first = &chat.requests()[0];
        // 2 windowed turns plus the current message.
        assert_eq!(first.messages.len(), 3);
        assert_eq!(first.messages[0].text(), "old 2");
        assert_eq!(first.messages[2].text(), "current");
    }

    #[tokio::test]
    async fn test_grounding_images_attached_to_user_message() {
        let encoder = MockEncoder::new(DIM);
        let fx = Fixture::new(encoder.clone()).await;
        let id = seed_embedded_item(&fx.items, fx.workspace_id, "Sunset photo", "",
            encoder.vector_for("sunset")).await;
        let mut item = fx.items.fetch(id).await.unwrap();
        item.kind = curio_core::ItemKind::Image;
        item.metadata = json!({"image_url": "https://cdn.example.com/s.jpg"});
        fx.items.seed(item);

        let chat = MockChatModel::new()
            .with_answer("x")
            .with_streamed_text(&["A sunset."]);
        fx.run(chat.clone(), TurnLoopConfig::default(), "sunset").await;

        let user_msg = chat.requests()[0].messages.last().unwrap().clone();
        assert!(user_msg
            .content
            .iter()
            .any(|p| matches!(p, curio_core::ContentPart::ImageUrl { url } if url.contains("s.jpg"))));
    }
}
