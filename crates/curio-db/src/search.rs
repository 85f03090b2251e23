//! Full-text search implementation.
//!
//! Lexical ranking over item title/body/summary using PostgreSQL tsvector
//! with field-weighted scoring: title (A) > summary (B) > body (C).

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use curio_core::{Error, LexicalIndex, Result, SearchHit};

/// Full-text search provider using PostgreSQL tsvector.
pub struct PgFtsSearch {
    pool: Pool<Postgres>,
}

impl PgFtsSearch {
    /// Create a new PgFtsSearch with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LexicalIndex for PgFtsSearch {
    async fn search(&self, workspace_id: Uuid, query: &str, limit: i64) -> Result<Vec<SearchHit>> {
        // The WHERE expression must match the GIN index expression exactly;
        // the weighted vector in ts_rank is computed per-row and needs no index.
        // Normalization flag 32 divides rank by rank+1 for a bounded score.
        let rows = sqlx::query(
            r#"
            SELECT id AS item_id,
                   ts_rank(
                       setweight(to_tsvector('english', coalesce(title, '')), 'A') ||
                       setweight(to_tsvector('english', coalesce(summary, '')), 'B') ||
                       setweight(to_tsvector('english', coalesce(body, '')), 'C'),
                       websearch_to_tsquery('english', $2),
                       32
                   ) AS score,
                   left(coalesce(body, summary, ''), 200) AS snippet,
                   title,
                   tags
            FROM item
            WHERE workspace_id = $1
              AND to_tsvector('english',
                      coalesce(title, '') || ' ' || coalesce(body, '') || ' ' || coalesce(summary, ''))
                  @@ websearch_to_tsquery('english', $2)
            ORDER BY score DESC
            LIMIT $3
            "#,
        )
        .bind(workspace_id)
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                item_id: row.get("item_id"),
                score: row.get::<Option<f32>, _>("score").unwrap_or(0.0),
                snippet: row.get("snippet"),
                title: row.get("title"),
                tags: row.get("tags"),
            })
            .collect())
    }
}
