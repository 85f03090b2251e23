//! Core traits for curio abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::chat::{ChatCompletion, ChatRequest, StreamDelta};
use crate::error::Result;
use crate::models::*;

// =============================================================================
// ENCODER BACKEND
// =============================================================================

/// One input to the vector encoder. Text and an image reference may be
/// combined so both modalities land in the same embedding.
#[derive(Debug, Clone, Default)]
pub struct EncodeInput {
    pub text: Option<String>,
    pub image_url: Option<String>,
}

impl EncodeInput {
    /// Text-only input.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_url: None,
        }
    }

    /// Attach an image reference to this input.
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Asymmetric encoding mode: documents and queries are transformed
/// differently so short queries compare meaningfully against long documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    Document,
    Query,
}

/// Backend that turns content into vectors in one shared multimodal space.
///
/// Failure semantics: each input yields exactly one vector or `None`, in
/// input order. Transport and provider errors are absorbed into `None`
/// entries — never surfaced as an error — so callers can degrade
/// deterministically.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode a batch of inputs. The returned list has the same length and
    /// order as `inputs`.
    async fn encode(&self, inputs: &[EncodeInput], mode: EncodeMode) -> Vec<Option<Vector>>;

    /// Width of the vectors this encoder produces.
    fn dimension(&self) -> usize;

    /// Encode a single input.
    async fn encode_one(&self, input: EncodeInput, mode: EncodeMode) -> Option<Vector> {
        self.encode(&[input], mode).await.into_iter().flatten().next()
    }
}

// =============================================================================
// CHAT BACKEND
// =============================================================================

/// Stream of deltas from a streaming chat response.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// Generative chat model consumed as a request/response service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Request a full response. Used while tool calls are plausible, since
    /// tool-call blocks are easiest to detect on a complete response.
    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion>;

    /// Request a token-streamed response for the final round of a turn.
    async fn stream(&self, req: &ChatRequest) -> Result<DeltaStream>;
}

// =============================================================================
// REPOSITORIES
// =============================================================================

/// Repository for item CRUD and embedding persistence.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Insert a new item, returning its id.
    async fn insert(&self, workspace_id: Uuid, req: CreateItemRequest) -> Result<Uuid>;

    /// Fetch a full item by id.
    async fn fetch(&self, id: Uuid) -> Result<Item>;

    /// List items in a workspace, most recently updated first.
    async fn list(&self, workspace_id: Uuid, limit: i64, offset: i64) -> Result<Vec<ItemSummary>>;

    /// Fetch the most recently updated full items (recency fallback).
    async fn recent(&self, workspace_id: Uuid, limit: i64) -> Result<Vec<Item>>;

    /// Apply a content update. Present fields replace stored values.
    async fn update_content(&self, id: Uuid, req: UpdateItemRequest) -> Result<()>;

    /// Write enrichment output and advance the enrichment status.
    async fn set_enrichment(
        &self,
        id: Uuid,
        body: Option<&str>,
        summary: Option<&str>,
        status: EnrichStatus,
    ) -> Result<()>;

    /// Overwrite the item's embedding. `Some` also marks the item `embedded`.
    async fn set_embedding(&self, id: Uuid, vector: Option<&Vector>) -> Result<()>;

    /// Delete an item.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// All (item id, embedding) pairs of a workspace, for projection.
    async fn embedded_vectors(&self, workspace_id: Uuid) -> Result<Vec<(Uuid, Vector)>>;
}

/// Repository for conversation sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a session, returning its id.
    async fn create(&self, workspace_id: Uuid, title: &str) -> Result<Uuid>;

    /// Fetch a full session by id.
    async fn fetch(&self, id: Uuid) -> Result<ConversationSession>;

    /// List sessions in a workspace, most recently updated first.
    async fn list(&self, workspace_id: Uuid) -> Result<Vec<SessionSummary>>;

    /// Append one utterance. Atomic at the storage layer: concurrent appends
    /// must all survive.
    async fn append_utterance(&self, id: Uuid, text: &str) -> Result<()>;

    /// Overwrite the session embedding.
    async fn set_embedding(&self, id: Uuid, vector: &Vector) -> Result<()>;

    /// Threshold search over session embeddings in a workspace.
    async fn find_similar(
        &self,
        workspace_id: Uuid,
        query: &Vector,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<SessionHit>>;

    /// Bump the session's updated_at.
    async fn touch(&self, id: Uuid) -> Result<()>;

    /// Delete a session (cascades its turns).
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for conversation turns.
#[async_trait]
pub trait TurnRepository: Send + Sync {
    /// Insert a turn, returning its id.
    async fn insert(&self, session_id: Uuid, role: TurnRole, content: &str) -> Result<Uuid>;

    /// The last `limit` turns of a session, in chronological order.
    async fn recent(&self, session_id: Uuid, limit: i64) -> Result<Vec<Turn>>;
}

/// Background job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue a job for an item.
    async fn queue(&self, item_id: Uuid, job_type: JobType, priority: i32) -> Result<Uuid>;

    /// Claim the next pending job whose type is in `job_types`.
    /// An empty slice claims any type.
    async fn claim_next(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark a job completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job failed; re-queues while retries remain.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Count of pending jobs.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// RANKING SOURCES
// =============================================================================

/// Lexical (full-text) ranked search over item text fields.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Top `limit` items by full-text relevance, scoped to a workspace.
    async fn search(&self, workspace_id: Uuid, query: &str, limit: i64) -> Result<Vec<SearchHit>>;
}

/// Vector-similarity ranked search over item embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `limit` items by ascending cosine distance, scoped to a workspace.
    async fn rank(&self, workspace_id: Uuid, query: &Vector, limit: i64)
        -> Result<Vec<SearchHit>>;

    /// Items whose cosine similarity to `query` exceeds `threshold`.
    async fn threshold_search(
        &self,
        workspace_id: Uuid,
        query: &Vector,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<SearchHit>>;
}
