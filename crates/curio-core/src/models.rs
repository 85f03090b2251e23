//! Core data model for curio.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// WORKSPACE TYPES
// =============================================================================

/// A workspace: the ownership scope for items and sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ITEM TYPES
// =============================================================================

/// Kind of content an item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Link,
    Image,
    Text,
    File,
    Note,
    ImportedDoc,
    ImportedMessage,
}

impl ItemKind {
    /// Kinds whose canonical content lives at an external source and must be
    /// fetched before the item can be fully embedded.
    pub fn needs_enrichment(&self) -> bool {
        matches!(self, Self::Link | Self::ImportedDoc)
    }

    /// Kinds that may carry an image reference usable for multimodal encoding.
    pub fn is_image_bearing(&self) -> bool {
        matches!(self, Self::Image | Self::Link)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Link => write!(f, "link"),
            Self::Image => write!(f, "image"),
            Self::Text => write!(f, "text"),
            Self::File => write!(f, "file"),
            Self::Note => write!(f, "note"),
            Self::ImportedDoc => write!(f, "imported_doc"),
            Self::ImportedMessage => write!(f, "imported_message"),
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "link" => Ok(Self::Link),
            "image" => Ok(Self::Image),
            "text" => Ok(Self::Text),
            "file" => Ok(Self::File),
            "note" => Ok(Self::Note),
            "imported_doc" => Ok(Self::ImportedDoc),
            "imported_message" => Ok(Self::ImportedMessage),
            _ => Err(format!("Invalid item kind: {}", s)),
        }
    }
}

/// Enrichment/indexing progress for an item, persisted so partial failure is
/// observable and retryable.
///
/// Lifecycle: `pending → enriched | failed → embedded`. A `failed` enrichment
/// still advances to `embedded` once encoding succeeds on whatever content is
/// available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichStatus {
    Pending,
    Enriched,
    Failed,
    Embedded,
}

impl std::fmt::Display for EnrichStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Enriched => write!(f, "enriched"),
            Self::Failed => write!(f, "failed"),
            Self::Embedded => write!(f, "embedded"),
        }
    }
}

impl std::str::FromStr for EnrichStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "enriched" => Ok(Self::Enriched),
            "failed" => Ok(Self::Failed),
            "embedded" => Ok(Self::Embedded),
            _ => Err(format!("Invalid enrich status: {}", s)),
        }
    }
}

/// A stored content item. The embedding, when present, is exactly
/// `defaults::EMBED_DIMENSION` wide and lives in the shared multimodal space
/// regardless of the item's kind.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub kind: ItemKind,
    pub title: String,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    /// Structured source fields (original URL, image reference, import ids).
    pub metadata: JsonValue,
    pub enrich_status: EnrichStatus,
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Build the canonical embeddable text: kind tag, title, body, summary,
    /// tag list, concatenated in fixed order. Identical input fields always
    /// produce identical embeddable text, which keeps re-indexing idempotent.
    pub fn embeddable_text(&self) -> String {
        let mut parts: Vec<String> = vec![format!("[{}]", self.kind), self.title.clone()];
        if let Some(body) = &self.body {
            if !body.is_empty() {
                parts.push(body.clone());
            }
        }
        if let Some(summary) = &self.summary {
            if !summary.is_empty() {
                parts.push(summary.clone());
            }
        }
        if !self.tags.is_empty() {
            parts.push(format!("tags: {}", self.tags.join(", ")));
        }
        parts.join("\n")
    }

    /// Extract an HTTP(S) image reference from the structured metadata.
    ///
    /// Only `http`/`https` schemes qualify; embedded data URIs and other
    /// schemes are rejected so the encoder never receives an unfetchable or
    /// payload-inflating reference.
    pub fn image_ref(&self) -> Option<&str> {
        if !self.kind.is_image_bearing() {
            return None;
        }
        let url = self
            .metadata
            .get("image_url")
            .and_then(JsonValue::as_str)
            .or_else(|| self.metadata.get("url").and_then(JsonValue::as_str))?;
        if url.starts_with("http://") || url.starts_with("https://") {
            Some(url)
        } else {
            None
        }
    }
}

/// Summary view of an item for listing and search responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: Uuid,
    pub kind: ItemKind,
    pub title: String,
    pub snippet: Option<String>,
    pub tags: Vec<String>,
    pub enrich_status: EnrichStatus,
    pub has_embedding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a new item.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemRequest {
    pub kind: ItemKind,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: JsonValue,
}

/// Request for updating item content. Any present field replaces the stored
/// one and triggers re-embedding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// A search result hit from a single ranking source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub item_id: Uuid,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A past-conversation hit from the session-embedding threshold search.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHit {
    pub session_id: Uuid,
    pub title: String,
    pub score: f32,
    /// First stretch of the session's concatenated utterances.
    pub preview: String,
}

/// A fused retrieval candidate. Ephemeral: exists only within one retrieval
/// call, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalCandidate {
    pub item_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
    pub fused_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

// =============================================================================
// CONVERSATION TYPES
// =============================================================================

/// A conversation session. The embedding, when present, encodes all
/// `user_utterances` concatenated in order; it is always recomputed from the
/// full list, never patched incrementally.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub user_utterances: Vec<String>,
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary view of a session for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub turn_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Speaker role within a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Invalid turn role: {}", s)),
        }
    }
}

/// One immutable turn of a conversation, ordered by `created_at` within its
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// PROJECTION TYPES
// =============================================================================

/// A 3D map position for one item. Ephemeral, computed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectedPoint {
    pub item_id: Uuid,
    pub position: [f32; 3],
}

/// A similarity-graph edge between two items. Computed on the original
/// embeddings, independent of the lossy 3D projection.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityEdge {
    pub from: Uuid,
    pub to: Uuid,
    pub similarity: f32,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Type of background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Fetch canonical content from the item's external source.
    Enrich,
    /// Encode the item and persist its vector.
    Embed,
}

impl JobType {
    /// Default priority for this job type (higher = more urgent).
    pub fn default_priority(&self) -> i32 {
        match self {
            // Enrichment gates embedding quality, so it drains first.
            JobType::Enrich => 7,
            JobType::Embed => 5,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enrich => write!(f, "enrich"),
            Self::Embed => write!(f, "embed"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "enrich" => Ok(Self::Enrich),
            "embed" => Ok(Self::Embed),
            _ => Err(format!("Invalid job type: {}", s)),
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub item_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
