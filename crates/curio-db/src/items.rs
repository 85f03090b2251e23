//! Item repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use curio_core::{
    CreateItemRequest, EnrichStatus, Error, Item, ItemKind, ItemRepository, ItemSummary, Result,
    UpdateItemRequest,
};

/// PostgreSQL implementation of ItemRepository.
pub struct PgItemRepository {
    pool: Pool<Postgres>,
}

impl PgItemRepository {
    /// Create a new PgItemRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn item_from_row(row: &PgRow) -> Result<Item> {
    let kind: String = row.get("kind");
    let enrich_status: String = row.get("enrich_status");
    Ok(Item {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        kind: kind.parse::<ItemKind>().map_err(Error::Internal)?,
        title: row.get("title"),
        body: row.get("body"),
        summary: row.get("summary"),
        tags: row.get("tags"),
        metadata: row.get("metadata"),
        enrich_status: enrich_status.parse::<EnrichStatus>().map_err(Error::Internal)?,
        embedding: row.get("embedding"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn summary_from_row(row: &PgRow) -> Result<ItemSummary> {
    let kind: String = row.get("kind");
    let enrich_status: String = row.get("enrich_status");
    Ok(ItemSummary {
        id: row.get("id"),
        kind: kind.parse::<ItemKind>().map_err(Error::Internal)?,
        title: row.get("title"),
        snippet: row.get("snippet"),
        tags: row.get("tags"),
        enrich_status: enrich_status.parse::<EnrichStatus>().map_err(Error::Internal)?,
        has_embedding: row.get("has_embedding"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn insert(&self, workspace_id: Uuid, req: CreateItemRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let initial_status = if req.kind.needs_enrichment() {
            EnrichStatus::Pending
        } else {
            // Nothing to fetch externally, so the enrichment phase is a no-op.
            EnrichStatus::Enriched
        };

        sqlx::query(
            "INSERT INTO item (id, workspace_id, kind, title, body, tags, metadata, enrich_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(workspace_id)
        .bind(req.kind.to_string())
        .bind(&req.title)
        .bind(&req.body)
        .bind(&req.tags)
        .bind(&req.metadata)
        .bind(initial_status.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Item> {
        let row = sqlx::query(
            "SELECT id, workspace_id, kind, title, body, summary, tags, metadata,
                    enrich_status, embedding, created_at, updated_at
             FROM item WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::ItemNotFound(id))?;

        item_from_row(&row)
    }

    async fn list(&self, workspace_id: Uuid, limit: i64, offset: i64) -> Result<Vec<ItemSummary>> {
        let rows = sqlx::query(
            "SELECT id, kind, title,
                    left(coalesce(body, summary, ''), 200) AS snippet,
                    tags, enrich_status,
                    (embedding IS NOT NULL) AS has_embedding,
                    created_at, updated_at
             FROM item
             WHERE workspace_id = $1
             ORDER BY updated_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(workspace_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn recent(&self, workspace_id: Uuid, limit: i64) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, kind, title, body, summary, tags, metadata,
                    enrich_status, embedding, created_at, updated_at
             FROM item
             WHERE workspace_id = $1
             ORDER BY updated_at DESC
             LIMIT $2",
        )
        .bind(workspace_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(item_from_row).collect()
    }

    async fn update_content(&self, id: Uuid, req: UpdateItemRequest) -> Result<()> {
        let result = sqlx::query(
            "UPDATE item SET
                title = coalesce($2, title),
                body = coalesce($3, body),
                summary = coalesce($4, summary),
                tags = coalesce($5, tags),
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(&req.title)
        .bind(&req.body)
        .bind(&req.summary)
        .bind(&req.tags)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::ItemNotFound(id));
        }
        Ok(())
    }

    async fn set_enrichment(
        &self,
        id: Uuid,
        body: Option<&str>,
        summary: Option<&str>,
        status: EnrichStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE item SET
                body = coalesce($2, body),
                summary = coalesce($3, summary),
                enrich_status = $4,
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(body)
        .bind(summary)
        .bind(status.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn set_embedding(&self, id: Uuid, vector: Option<&Vector>) -> Result<()> {
        // Full-row overwrite keyed by primary id; readers tolerate a stale or
        // absent embedding, so no locking is needed.
        match vector {
            Some(v) => {
                sqlx::query("UPDATE item SET embedding = $2, enrich_status = $3 WHERE id = $1")
                    .bind(id)
                    .bind(v)
                    .bind(EnrichStatus::Embedded.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(Error::Database)?;
            }
            None => {
                sqlx::query("UPDATE item SET embedding = NULL WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(Error::Database)?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::ItemNotFound(id));
        }
        Ok(())
    }

    async fn embedded_vectors(&self, workspace_id: Uuid) -> Result<Vec<(Uuid, Vector)>> {
        let rows = sqlx::query(
            "SELECT id, embedding FROM item
             WHERE workspace_id = $1 AND embedding IS NOT NULL
             ORDER BY created_at",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("embedding")))
            .collect())
    }
}
