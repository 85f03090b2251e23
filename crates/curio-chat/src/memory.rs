//! Session memory aggregation.
//!
//! A session's embedding encodes all of its user utterances as one document,
//! so past conversations resurface in retrieval. The embedding is always
//! recomputed from the full utterance list, never patched incrementally.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use curio_core::{EncodeInput, EncodeMode, Encoder, Result, SessionRepository};

/// Aggregates a session's utterances into one embeddable unit.
pub struct SessionMemory {
    sessions: Arc<dyn SessionRepository>,
    encoder: Arc<dyn Encoder>,
}

impl SessionMemory {
    /// Create a session memory aggregator.
    pub fn new(sessions: Arc<dyn SessionRepository>, encoder: Arc<dyn Encoder>) -> Self {
        Self { sessions, encoder }
    }

    /// Append one user utterance. The append is atomic at the storage layer,
    /// so concurrent turns never lose each other's utterances.
    pub async fn append_utterance(&self, session_id: Uuid, text: &str) -> Result<()> {
        self.sessions.append_utterance(session_id, text).await
    }

    /// Recompute the session embedding from the full utterance list.
    ///
    /// A degraded encoder leaves the stored embedding untouched: a stale
    /// session embedding degrades ranking quality, never correctness.
    pub async fn reembed(&self, session_id: Uuid) -> Result<()> {
        let session = self.sessions.fetch(session_id).await?;
        if session.user_utterances.is_empty() {
            return Ok(());
        }

        let document = session.user_utterances.join("\n\n");
        match self
            .encoder
            .encode_one(EncodeInput::text(document), EncodeMode::Document)
            .await
        {
            Some(vector) => {
                self.sessions.set_embedding(session_id, &vector).await?;
                debug!(
                    subsystem = "chat",
                    component = "memory",
                    op = "reembed",
                    session_id = %session_id,
                    utterance_count = session.user_utterances.len(),
                    "Session re-embedded"
                );
                Ok(())
            }
            None => {
                debug!(
                    subsystem = "chat",
                    component = "memory",
                    session_id = %session_id,
                    "Encoder unavailable, keeping previous session embedding"
                );
                Ok(())
            }
        }
    }

    /// Best-effort re-embed, invoked after every completed assistant turn.
    /// Failure is logged and self-heals on the next turn's re-embed.
    pub async fn reembed_best_effort(&self, session_id: Uuid) {
        if let Err(e) = self.reembed(session_id).await {
            warn!(
                subsystem = "chat",
                component = "memory",
                session_id = %session_id,
                error = %e,
                "Session re-embed failed"
            );
        }
    }
}
