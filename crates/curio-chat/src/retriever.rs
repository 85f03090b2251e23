//! Grounding context assembly for one user turn.
//!
//! Runs the hybrid item search and the past-conversation search concurrently
//! and merges both into one human-readable context block. When the query
//! cannot be encoded the retriever degrades to the most recently updated
//! items, labeled as recent rather than relevant — degraded retrieval is
//! never surfaced as an error.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{
    EncodeInput, EncodeMode, Encoder, Item, ItemRepository, RetrievalCandidate,
    SessionRepository, Vector,
};
use curio_search::HybridRanker;

/// Grounding material assembled for one user turn.
#[derive(Debug, Default)]
pub struct RetrievedContext {
    /// Human-readable context block appended to the system instructions.
    pub text: String,
    /// Publicly fetchable image URLs for multimodal grounding.
    pub images: Vec<String>,
    /// Ranked candidates, for the `context` side-channel frame. Empty when
    /// retrieval fell back to recency.
    pub candidates: Vec<RetrievalCandidate>,
    /// The encoded query, reusable by tool calls within the same turn.
    pub query_vector: Option<Vector>,
}

/// Assembles grounding context from the hybrid ranker and session memory.
pub struct ContextRetriever {
    encoder: Arc<dyn Encoder>,
    ranker: Arc<HybridRanker>,
    items: Arc<dyn ItemRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl ContextRetriever {
    /// Create a retriever over the given search and storage backends.
    pub fn new(
        encoder: Arc<dyn Encoder>,
        ranker: Arc<HybridRanker>,
        items: Arc<dyn ItemRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            encoder,
            ranker,
            items,
            sessions,
        }
    }

    /// Assemble grounding context for `query`, scoped to a workspace.
    pub async fn retrieve(&self, workspace_id: Uuid, query: &str) -> RetrievedContext {
        let query_vector = self
            .encoder
            .encode_one(EncodeInput::text(query), EncodeMode::Query)
            .await;

        let Some(vector) = query_vector else {
            return self.recency_fallback(workspace_id).await;
        };

        // Items and past conversations are independent signals; search both
        // at once.
        let (candidates, session_hits) = tokio::join!(
            self.ranker.search(
                workspace_id,
                query,
                Some(&vector),
                defaults::SEARCH_LIMIT as usize
            ),
            self.sessions.find_similar(
                workspace_id,
                &vector,
                defaults::SESSION_GROUNDING_THRESHOLD,
                defaults::SEARCH_LIMIT,
            )
        );
        let session_hits = session_hits.unwrap_or_else(|e| {
            warn!(
                subsystem = "chat",
                component = "retriever",
                error = %e,
                "Session search failed, grounding on items only"
            );
            Vec::new()
        });

        let mut text = String::new();
        let mut images = Vec::new();

        if !candidates.is_empty() {
            text.push_str("Relevant items from the collection:\n");
            for candidate in &candidates {
                match self.items.fetch(candidate.item_id).await {
                    Ok(item) => {
                        text.push_str(&item_entry(&item));
                        if images.len() < defaults::CONTEXT_IMAGE_MAX {
                            if let Some(url) = public_image_ref(&item) {
                                images.push(url.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        // Ranking can momentarily outlive a deleted item.
                        debug!(item_id = %candidate.item_id, error = %e, "Skipping vanished candidate");
                    }
                }
            }
        }

        if !session_hits.is_empty() {
            text.push_str("\nRelevant past conversations:\n");
            for hit in &session_hits {
                text.push_str(&truncate_entry(&format!(
                    "- {} — {}\n",
                    hit.title, hit.preview
                )));
            }
        }

        debug!(
            subsystem = "chat",
            component = "retriever",
            op = "retrieve",
            workspace_id = %workspace_id,
            result_count = candidates.len(),
            session_hits = session_hits.len(),
            image_count = images.len(),
            "Context assembled"
        );

        RetrievedContext {
            text,
            images,
            candidates,
            query_vector: Some(vector),
        }
    }

    /// Degraded mode: no query vector, so ground on the most recently
    /// updated items with an explicit "recent" label.
    async fn recency_fallback(&self, workspace_id: Uuid) -> RetrievedContext {
        let items = self
            .items
            .recent(workspace_id, defaults::RECENCY_FALLBACK_LIMIT)
            .await
            .unwrap_or_else(|e| {
                warn!(
                    subsystem = "chat",
                    component = "retriever",
                    error = %e,
                    "Recency fallback failed, proceeding without grounding"
                );
                Vec::new()
            });

        let mut text = String::new();
        if !items.is_empty() {
            text.push_str("Recent items from the collection (ranking unavailable):\n");
            for item in &items {
                text.push_str(&item_entry(item));
            }
        }

        debug!(
            subsystem = "chat",
            component = "retriever",
            op = "retrieve",
            workspace_id = %workspace_id,
            result_count = items.len(),
            "Recency fallback context assembled"
        );

        RetrievedContext {
            text,
            images: Vec::new(),
            candidates: Vec::new(),
            query_vector: None,
        }
    }
}

/// One context entry for an item, bounded to the entry budget.
fn item_entry(item: &Item) -> String {
    let content = item
        .body
        .as_deref()
        .or(item.summary.as_deref())
        .unwrap_or_default();
    let mut entry = format!("- {} [{}]", item.title, item.kind);
    if !item.tags.is_empty() {
        entry.push_str(&format!(" ({})", item.tags.join(", ")));
    }
    if !content.is_empty() {
        entry.push_str(": ");
        entry.push_str(content);
    }
    entry.push('\n');
    truncate_entry(&entry)
}

/// Truncate a context entry to the per-entry character budget.
fn truncate_entry(entry: &str) -> String {
    if entry.chars().count() <= defaults::CONTEXT_ENTRY_BUDGET {
        return entry.to_string();
    }
    let mut truncated: String = entry
        .chars()
        .take(defaults::CONTEXT_ENTRY_BUDGET - 2)
        .collect();
    truncated.push_str("…\n");
    truncated
}

/// An item's image reference, if it is publicly fetchable.
///
/// Session-scoped thumbnails (imported attachments behind authenticated
/// URLs) are excluded: the model's image fetcher has no credentials. Their
/// text metadata still participates in ranking.
fn public_image_ref(item: &Item) -> Option<&str> {
    if item
        .metadata
        .get("image_requires_auth")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        return None;
    }
    item.image_ref()
}
