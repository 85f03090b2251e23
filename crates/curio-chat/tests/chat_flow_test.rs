//! End-to-end chat turn flow against mock backends.
//!
//! Exercises the public surface of curio-chat the way curio-api wires it:
//! retrieval grounding, the dialogue loop, event framing, and persistence,
//! with deterministic mock encoder/chat backends and in-memory repositories.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use curio_chat::{ContextRetriever, SessionMemory, ToolRegistry, TurnLoop, TurnLoopConfig};
use curio_core::testing::{
    MemoryItemRepository, MemorySessionRepository, MemoryTurnRepository,
};
use curio_core::{
    ChatEvent, CreateItemRequest, Encoder, ItemKind, ItemRepository, LexicalIndex, Result,
    SearchHit, SessionRepository, TurnRole, Vector, VectorIndex,
};
use curio_inference::{MockChatModel, MockEncoder};
use curio_search::{cosine_similarity, HybridRanker};

const DIM: usize = 16;

/// Substring-match lexical ranking over the in-memory repository.
struct NaiveLexical(Arc<MemoryItemRepository>);

#[async_trait]
impl LexicalIndex for NaiveLexical {
    async fn search(&self, workspace_id: Uuid, query: &str, limit: i64) -> Result<Vec<SearchHit>> {
        let terms: Vec<String> = query.to_lowercase().split_whitespace().map(String::from).collect();
        let mut hits: Vec<SearchHit> = self
            .0
            .recent(workspace_id, i64::MAX)
            .await?
            .into_iter()
            .filter_map(|item| {
                let haystack = format!(
                    "{} {}",
                    item.title,
                    item.body.as_deref().unwrap_or_default()
                )
                .to_lowercase();
                let score = terms.iter().filter(|t| haystack.contains(*t)).count() as f32;
                (score > 0.0).then(|| SearchHit {
                    item_id: item.id,
                    score,
                    snippet: item.body.clone(),
                    title: Some(item.title.clone()),
                    tags: item.tags.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit as usize);
        Ok(hits)
    }
}

/// Cosine ranking over embedded items in the in-memory repository.
struct NaiveVectors(Arc<MemoryItemRepository>);

impl NaiveVectors {
    async fn scored(&self, workspace_id: Uuid, query: &Vector) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .0
            .recent(workspace_id, i64::MAX)
            .await?
            .into_iter()
            .filter_map(|item| {
                let embedding = item.embedding.as_ref()?;
                Some(SearchHit {
                    item_id: item.id,
                    score: cosine_similarity(embedding.as_slice(), query.as_slice()),
                    snippet: item.body.clone(),
                    title: Some(item.title.clone()),
                    tags: item.tags.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for NaiveVectors {
    async fn rank(&self, workspace_id: Uuid, query: &Vector, limit: i64) -> Result<Vec<SearchHit>> {
        let mut hits = self.scored(workspace_id, query).await?;
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn threshold_search(
        &self,
        workspace_id: Uuid,
        query: &Vector,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = self.scored(workspace_id, query).await?;
        hits.retain(|h| h.score > threshold);
        hits.truncate(limit as usize);
        Ok(hits)
    }
}

struct Harness {
    items: Arc<MemoryItemRepository>,
    sessions: Arc<MemorySessionRepository>,
    turns: Arc<MemoryTurnRepository>,
    encoder: MockEncoder,
    workspace_id: Uuid,
    session_id: Uuid,
}

impl Harness {
    async fn new(encoder: MockEncoder) -> Self {
        let items = Arc::new(MemoryItemRepository::new());
        let sessions = Arc::new(MemorySessionRepository::new());
        let turns = Arc::new(MemoryTurnRepository::new());
        let workspace_id = Uuid::new_v4();
        let session_id = sessions.create(workspace_id, "flow test").await.unwrap();
        Self {
            items,
            sessions,
            turns,
            encoder,
            workspace_id,
            session_id,
        }
    }

    async fn seed_item(&self, title: &str, body: &str, embed_as: &str) -> Uuid {
        let id = self
            .items
            .insert(
                self.workspace_id,
                CreateItemRequest {
                    kind: ItemKind::Note,
                    title: title.to_string(),
                    body: Some(body.to_string()),
                    tags: Vec::new(),
                    metadata: json!({}),
                },
            )
            .await
            .unwrap();
        let vector = self.encoder.vector_for(embed_as);
        self.items.set_embedding(id, Some(&vector)).await.unwrap();
        id
    }

    async fn run_turn(&self, chat: MockChatModel, message: &str) -> Vec<ChatEvent> {
        let encoder: Arc<dyn Encoder> = Arc::new(self.encoder.clone());
        let ranker = Arc::new(HybridRanker::new(
            Arc::new(NaiveLexical(self.items.clone())),
            Arc::new(NaiveVectors(self.items.clone())),
        ));
        let turn_loop = TurnLoop::new(
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
        .with_config(TurnLoopConfig::default());

        let (tx, mut rx) = mpsc::channel(64);
        turn_loop
            .run_turn(self.workspace_id, self.session_id, message, tx)
            .await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }
}

#[tokio::test]
async fn grounded_answer_flows_end_to_end() {
    let harness = Harness::new(MockEncoder::new(DIM)).await;
    let relevant = harness
        .seed_item("Intro to pgvector", "vector search in postgres", "vector search")
        .await;
    harness
        .seed_item("Quarterly marketing plan", "q3 campaign outline", "marketing budgets")
        .await;

    let chat = MockChatModel::new()
        .with_answer("probe")
        .with_streamed_text(&["pgvector covers ", "this."]);
    let events = harness.run_turn(chat.clone(), "vector search").await;

    // The context frame leads and ranks the relevant item first.
    match &events[0] {
        ChatEvent::Context { items } => {
            assert!(!items.is_empty());
            assert_eq!(items[0].item_id, relevant);
        }
        other => panic!("Expected context frame first, got {:?}", other),
    }

    // The grounding block reached the model.
    assert!(chat.requests()[0].system.contains("Intro to pgvector"));

    // The streamed text arrived in order and done terminated the stream.
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Text { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "pgvector covers this.");
    assert!(matches!(events.last(), Some(ChatEvent::Done)));

    // Exactly one user and one assistant turn were persisted.
    let turns = harness.turns.all();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, TurnRole::User);
    assert_eq!(turns[1].content, "pgvector covers this.");

    // The session re-embedded from its utterances.
    let session = harness.sessions.fetch(harness.session_id).await.unwrap();
    assert_eq!(
        session.embedding.unwrap().as_slice(),
        harness.encoder.vector_for("vector search").as_slice()
    );
}

#[tokio::test]
async fn tool_round_trip_reaches_final_answer() {
    let harness = Harness::new(MockEncoder::new(DIM)).await;
    harness
        .seed_item("Reading list", "rust async book", "rust async")
        .await;

    let chat = MockChatModel::new()
        .with_tool_round(vec![curio_core::ToolCall {
            id: "call_1".to_string(),
            name: "search_items".to_string(),
            arguments: json!({"query": "rust async"}),
        }])
        .with_answer("probe")
        .with_streamed_text(&["Your reading list has it."]);
    let events = harness.run_turn(chat.clone(), "what should I read?").await;

    // Status frame announced the tool, and the tool result fed the model.
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::Status { message } if message.contains("search_items")
    )));
    let followup = &chat.requests()[1];
    let tool_result = followup
        .messages
        .iter()
        .find(|m| m.tool_call_id.is_some())
        .unwrap();
    assert!(tool_result.text().contains("Reading list"));

    assert!(matches!(events.last(), Some(ChatEvent::Done)));
}

#[tokio::test]
async fn degraded_encoder_recency_fallback_reaches_model() {
    let harness = Harness::new(MockEncoder::new(DIM).unavailable()).await;
    harness.seed_item("Only item", "something recent", "unused").await;

    let chat = MockChatModel::new()
        .with_answer("probe")
        .with_streamed_text(&["Here is what you saved recently."]);
    let events = harness.run_turn(chat.clone(), "anything new?").await;

    // No ranking means no context frame, and the block is labeled recent.
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Context { .. })));
    assert!(chat.requests()[0].system.contains("Recent items"));
    assert!(matches!(events.last(), Some(ChatEvent::Done)));
}
