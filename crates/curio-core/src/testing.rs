//! In-memory repository implementations for deterministic testing.
//!
//! These mirror the storage contract closely enough to exercise the
//! indexing, retrieval, and dialogue layers without a database: recency
//! ordering, atomic utterance appends, threshold searches, and job claiming
//! all behave like their PostgreSQL counterparts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::traits::*;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

/// In-memory [`ItemRepository`].
#[derive(Clone, Default)]
pub struct MemoryItemRepository {
    items: Arc<Mutex<HashMap<Uuid, Item>>>,
}

impl MemoryItemRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prebuilt item directly, bypassing the create path.
    pub fn seed(&self, item: Item) {
        self.items.lock().unwrap().insert(item.id, item);
    }

    fn sorted_by_recency(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.lock().unwrap().values().cloned().collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        items
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn insert(&self, workspace_id: Uuid, req: CreateItemRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let enrich_status = if req.kind.needs_enrichment() {
            EnrichStatus::Pending
        } else {
            EnrichStatus::Enriched
        };
        self.items.lock().unwrap().insert(
            id,
            Item {
                id,
                workspace_id,
                kind: req.kind,
                title: req.title,
                body: req.body,
                summary: None,
                tags: req.tags,
                metadata: req.metadata,
                enrich_status,
                embedding: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Item> {
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::ItemNotFound(id))
    }

    async fn list(&self, workspace_id: Uuid, limit: i64, offset: i64) -> Result<Vec<ItemSummary>> {
        Ok(self
            .sorted_by_recency()
            .into_iter()
            .filter(|i| i.workspace_id == workspace_id)
            .skip(offset as usize)
            .take(limit as usize)
            .map(|i| ItemSummary {
                id: i.id,
                kind: i.kind,
                title: i.title,
                snippet: i.body.or(i.summary).map(|s| s.chars().take(200).collect()),
                tags: i.tags,
                enrich_status: i.enrich_status,
                has_embedding: i.embedding.is_some(),
                created_at: i.created_at,
                updated_at: i.updated_at,
            })
            .collect())
    }

    async fn recent(&self, workspace_id: Uuid, limit: i64) -> Result<Vec<Item>> {
        Ok(self
            .sorted_by_recency()
            .into_iter()
            .filter(|i| i.workspace_id == workspace_id)
            .take(limit as usize)
            .collect())
    }

    async fn update_content(&self, id: Uuid, req: UpdateItemRequest) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        if let Some(title) = req.title {
            item.title = title;
        }
        if let Some(body) = req.body {
            item.body = Some(body);
        }
        if let Some(summary) = req.summary {
            item.summary = Some(summary);
        }
        if let Some(tags) = req.tags {
            item.tags = tags;
        }
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn set_enrichment(
        &self,
        id: Uuid,
        body: Option<&str>,
        summary: Option<&str>,
        status: EnrichStatus,
    ) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        if let Some(body) = body {
            item.body = Some(body.to_string());
        }
        if let Some(summary) = summary {
            item.summary = Some(summary.to_string());
        }
        item.enrich_status = status;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn set_embedding(&self, id: Uuid, vector: Option<&Vector>) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        item.embedding = vector.cloned();
        if vector.is_some() {
            item.enrich_status = EnrichStatus::Embedded;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.items
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::ItemNotFound(id))
    }

    async fn embedded_vectors(&self, workspace_id: Uuid) -> Result<Vec<(Uuid, Vector)>> {
        let mut items: Vec<Item> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.workspace_id == workspace_id && i.embedding.is_some())
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items
            .into_iter()
            .filter_map(|i| i.embedding.map(|e| (i.id, e)))
            .collect())
    }
}

/// In-memory [`SessionRepository`].
#[derive(Clone, Default)]
pub struct MemorySessionRepository {
    sessions: Arc<Mutex<HashMap<Uuid, ConversationSession>>>,
}

impl MemorySessionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, workspace_id: Uuid, title: &str) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        self.sessions.lock().unwrap().insert(
            id,
            ConversationSession {
                id,
                workspace_id,
                title: title.to_string(),
                user_utterances: Vec::new(),
                embedding: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<ConversationSession> {
        self.sessions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::SessionNotFound(id))
    }

    async fn list(&self, workspace_id: Uuid) -> Result<Vec<SessionSummary>> {
        let mut sessions: Vec<ConversationSession> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions
            .into_iter()
            .map(|s| SessionSummary {
                id: s.id,
                title: s.title,
                turn_count: 0,
                created_at: s.created_at,
                updated_at: s.updated_at,
            })
            .collect())
    }

    async fn append_utterance(&self, id: Uuid, text: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        session.user_utterances.push(text.to_string());
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn set_embedding(&self, id: Uuid, vector: &Vector) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        session.embedding = Some(vector.clone());
        Ok(())
    }

    async fn find_similar(
        &self,
        workspace_id: Uuid,
        query: &Vector,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<SessionHit>> {
        let mut hits: Vec<SessionHit> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .filter_map(|s| {
                let embedding = s.embedding.as_ref()?;
                let score = cosine(embedding.as_slice(), query.as_slice());
                (score > threshold).then(|| SessionHit {
                    session_id: s.id,
                    title: s.title.clone(),
                    score,
                    preview: s
                        .user_utterances
                        .join(" ")
                        .chars()
                        .take(200)
                        .collect(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn touch(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::SessionNotFound(id))
    }
}

/// In-memory [`TurnRepository`]. Insertion order breaks created-at ties so
/// same-instant turns keep their write order, like the UUIDv7 primary key
/// does in PostgreSQL.
#[derive(Clone, Default)]
pub struct MemoryTurnRepository {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl MemoryTurnRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns across all sessions, in insertion order.
    pub fn all(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnRepository for MemoryTurnRepository {
    async fn insert(&self, session_id: Uuid, role: TurnRole, content: &str) -> Result<Uuid> {
        let id = Uuid::now_v7();
        self.turns.lock().unwrap().push(Turn {
            id,
            session_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent(&self, session_id: Uuid, limit: i64) -> Result<Vec<Turn>> {
        let turns = self.turns.lock().unwrap();
        let session_turns: Vec<Turn> = turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        let skip = session_turns.len().saturating_sub(limit as usize);
        Ok(session_turns.into_iter().skip(skip).collect())
    }
}

/// In-memory [`JobQueue`].
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    jobs: Arc<Mutex<Vec<Job>>>,
}

impl MemoryJobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs ever queued, in queue order.
    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn queue(&self, item_id: Uuid, job_type: JobType, priority: i32) -> Result<Uuid> {
        let id = Uuid::now_v7();
        self.jobs.lock().unwrap().push(Job {
            id,
            item_id,
            job_type,
            status: JobStatus::Pending,
            priority,
            error_message: None,
            retry_count: 0,
            max_retries: crate::defaults::JOB_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        });
        Ok(id)
    }

    async fn claim_next(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut candidates: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| {
                j.status == JobStatus::Pending
                    && (job_types.is_empty() || job_types.contains(&j.job_type))
            })
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|&a, &b| {
            jobs[b]
                .priority
                .cmp(&jobs[a].priority)
                .then(jobs[a].created_at.cmp(&jobs[b].created_at))
        });
        let Some(&idx) = candidates.first() else {
            return Ok(None);
        };
        jobs[idx].status = JobStatus::Running;
        jobs[idx].started_at = Some(Utc::now());
        Ok(Some(jobs[idx].clone()))
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.retry_count += 1;
            job.error_message = Some(error.to_string());
            if job.retry_count >= job.max_retries {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
            } else {
                job.status = JobStatus::Pending;
            }
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_req(kind: ItemKind, title: &str) -> CreateItemRequest {
        CreateItemRequest {
            kind,
            title: title.to_string(),
            body: None,
            tags: Vec::new(),
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn test_items_recency_order() {
        let repo = MemoryItemRepository::new();
        let ws = Uuid::new_v4();
        let first = repo.insert(ws, create_req(ItemKind::Note, "first")).await.unwrap();
        let second = repo.insert(ws, create_req(ItemKind::Note, "second")).await.unwrap();

        repo.update_content(
            first,
            UpdateItemRequest {
                body: Some("bumped".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let recent = repo.recent(ws, 10).await.unwrap();
        assert_eq!(recent[0].id, first);
        assert_eq!(recent[1].id, second);
    }

    #[tokio::test]
    async fn test_session_append_and_find_similar_strict_threshold() {
        let repo = MemorySessionRepository::new();
        let ws = Uuid::new_v4();
        let id = repo.create(ws, "chat").await.unwrap();
        repo.append_utterance(id, "hello").await.unwrap();
        repo.set_embedding(id, &Vector::from(vec![1.0, 0.0])).await.unwrap();

        // Exactly at threshold: excluded (strict >).
        let query = Vector::from(vec![1.0, 0.0]);
        let hits = repo.find_similar(ws, &query, 1.0, 10).await.unwrap();
        assert!(hits.is_empty());

        let hits = repo.find_similar(ws, &query, 0.5, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].preview, "hello");
    }

    #[tokio::test]
    async fn test_turns_window_keeps_chronological_order() {
        let repo = MemoryTurnRepository::new();
        let session = Uuid::new_v4();
        for i in 0..5 {
            repo.insert(session, TurnRole::User, &format!("turn {}", i)).await.unwrap();
        }
        let recent = repo.recent(session, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "turn 2");
        assert_eq!(recent[2].content, "turn 4");
    }

    #[tokio::test]
    async fn test_job_queue_priority_and_retry() {
        let queue = MemoryJobQueue::new();
        let item = Uuid::new_v4();
        queue.queue(item, JobType::Embed, 5).await.unwrap();
        queue.queue(item, JobType::Enrich, 7).await.unwrap();

        let first = queue.claim_next(&[]).await.unwrap().unwrap();
        assert_eq!(first.job_type, JobType::Enrich);

        queue.fail(first.id, "boom").await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_claim_next_filters_by_type() {
        let queue = MemoryJobQueue::new();
        queue.queue(Uuid::new_v4(), JobType::Enrich, 7).await.unwrap();
        let claimed = queue.claim_next(&[JobType::Embed]).await.unwrap();
        assert!(claimed.is_none());
    }
}
