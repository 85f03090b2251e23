//! Conversation session and turn repository implementations.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use curio_core::{
    ConversationSession, Error, Result, SessionHit, SessionRepository, SessionSummary, Turn,
    TurnRepository, TurnRole,
};

/// PostgreSQL implementation of SessionRepository.
pub struct PgSessionRepository {
    pool: Pool<Postgres>,
}

impl PgSessionRepository {
    /// Create a new PgSessionRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, workspace_id: Uuid, title: &str) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO conversation_session (id, workspace_id, title) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(workspace_id)
        .bind(title)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<ConversationSession> {
        let row = sqlx::query(
            "SELECT id, workspace_id, title, user_utterances, embedding, created_at, updated_at
             FROM conversation_session WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::SessionNotFound(id))?;

        Ok(ConversationSession {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            title: row.get("title"),
            user_utterances: row.get("user_utterances"),
            embedding: row.get("embedding"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn list(&self, workspace_id: Uuid) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT s.id, s.title, s.created_at, s.updated_at,
                    (SELECT count(*) FROM turn t WHERE t.session_id = s.id) AS turn_count
             FROM conversation_session s
             WHERE s.workspace_id = $1
             ORDER BY s.updated_at DESC",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| SessionSummary {
                id: row.get("id"),
                title: row.get("title"),
                turn_count: row.get("turn_count"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn append_utterance(&self, id: Uuid, text: &str) -> Result<()> {
        // array_append makes the append atomic at the storage layer; two
        // concurrent appends both land, in commit order.
        let result = sqlx::query(
            "UPDATE conversation_session
             SET user_utterances = array_append(user_utterances, $2), updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::SessionNotFound(id));
        }
        Ok(())
    }

    async fn set_embedding(&self, id: Uuid, vector: &Vector) -> Result<()> {
        sqlx::query("UPDATE conversation_session SET embedding = $2 WHERE id = $1")
            .bind(id)
            .bind(vector)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn find_similar(
        &self,
        workspace_id: Uuid,
        query: &Vector,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<SessionHit>> {
        let rows = sqlx::query(
            "SELECT id, title,
                    1.0 - (embedding <=> $2::vector) AS score,
                    left(array_to_string(user_utterances, ' '), 200) AS preview
             FROM conversation_session
             WHERE workspace_id = $1
               AND embedding IS NOT NULL
               AND 1.0 - (embedding <=> $2::vector) > $3
             ORDER BY embedding <=> $2::vector
             LIMIT $4",
        )
        .bind(workspace_id)
        .bind(query)
        .bind(threshold as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| SessionHit {
                session_id: row.get("id"),
                title: row.get("title"),
                score: row.get::<f64, _>("score") as f32,
                preview: row.get("preview"),
            })
            .collect())
    }

    async fn touch(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE conversation_session SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM conversation_session WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::SessionNotFound(id));
        }
        Ok(())
    }
}

/// PostgreSQL implementation of TurnRepository.
pub struct PgTurnRepository {
    pool: Pool<Postgres>,
}

impl PgTurnRepository {
    /// Create a new PgTurnRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TurnRepository for PgTurnRepository {
    async fn insert(&self, session_id: Uuid, role: TurnRole, content: &str) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO turn (id, session_id, role, content) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(session_id)
            .bind(role.to_string())
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(id)
    }

    async fn recent(&self, session_id: Uuid, limit: i64) -> Result<Vec<Turn>> {
        // Take the newest `limit` rows, then flip back to chronological order.
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM (
                 SELECT id, session_id, role, content, created_at
                 FROM turn
                 WHERE session_id = $1
                 ORDER BY created_at DESC
                 LIMIT $2
             ) recent
             ORDER BY created_at",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                let role: String = row.get("role");
                Ok(Turn {
                    id: row.get("id"),
                    session_id: row.get("session_id"),
                    role: role.parse::<TurnRole>().map_err(Error::Internal)?,
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}
