//! Vector-similarity search over item embeddings.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use curio_core::{Error, Result, SearchHit, VectorIndex};

/// PostgreSQL/pgvector implementation of VectorIndex.
pub struct PgVectorSearch {
    pool: Pool<Postgres>,
}

impl PgVectorSearch {
    /// Create a new PgVectorSearch with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn hit_from_row(row: &sqlx::postgres::PgRow) -> SearchHit {
    SearchHit {
        item_id: row.get("item_id"),
        score: row.get::<f64, _>("score") as f32,
        snippet: row.get("snippet"),
        title: row.get("title"),
        tags: row.get("tags"),
    }
}

#[async_trait]
impl VectorIndex for PgVectorSearch {
    async fn rank(
        &self,
        workspace_id: Uuid,
        query: &Vector,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT id AS item_id,
                   1.0 - (embedding <=> $2::vector) AS score,
                   left(coalesce(body, summary, ''), 200) AS snippet,
                   title,
                   tags
            FROM item
            WHERE workspace_id = $1 AND embedding IS NOT NULL
            ORDER BY embedding <=> $2::vector
            LIMIT $3
            "#,
        )
        .bind(workspace_id)
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(hit_from_row).collect())
    }

    async fn threshold_search(
        &self,
        workspace_id: Uuid,
        query: &Vector,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT id AS item_id,
                   1.0 - (embedding <=> $2::vector) AS score,
                   left(coalesce(body, summary, ''), 200) AS snippet,
                   title,
                   tags
            FROM item
            WHERE workspace_id = $1
              AND embedding IS NOT NULL
              AND 1.0 - (embedding <=> $2::vector) > $3
            ORDER BY embedding <=> $2::vector
            LIMIT $4
            "#,
        )
        .bind(workspace_id)
        .bind(query)
        .bind(threshold as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(hit_from_row).collect())
    }
}
