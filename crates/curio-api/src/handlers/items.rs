//! Item CRUD (thin).
//!
//! Creation and content updates return before indexing completes: the write
//! path only queues the background job, and clients poll `enrich_status` on
//! the item payload for progress.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{
    CreateItemRequest, EnrichStatus, Item, ItemKind, ItemRepository, JobQueue, JobType,
    UpdateItemRequest,
};
use curio_jobs::queue_indexing;

use crate::error::ApiError;
use crate::state::AppState;

/// Item payload without the raw embedding vector.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub kind: ItemKind,
    pub title: String,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub metadata: JsonValue,
    pub enrich_status: EnrichStatus,
    pub has_embedding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            workspace_id: item.workspace_id,
            kind: item.kind,
            title: item.title,
            body: item.body,
            summary: item.summary,
            tags: item.tags,
            metadata: item.metadata,
            enrich_status: item.enrich_status,
            has_embedding: item.embedding.is_some(),
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    defaults::PAGE_LIMIT
}

pub async fn create_item(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Json(req): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Item title must not be empty".into()));
    }
    if !state.db.workspaces.exists(workspace_id).await? {
        return Err(ApiError::NotFound(format!("workspace {}", workspace_id)));
    }

    let id = state.items.insert(workspace_id, req).await?;
    let item = state.items.fetch(id).await?;

    // Fire-and-forget: the response does not wait for enrichment or
    // encoding. A failed queue insert only delays indexing until backfill.
    if let Err(e) = queue_indexing(&*state.jobs, &item).await {
        warn!(item_id = %id, error = %e, "Failed to queue indexing");
    }

    Ok((StatusCode::CREATED, Json(ItemResponse::from(item))))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.items.fetch(id).await?;
    Ok(Json(ItemResponse::from(item)))
}

pub async fn list_items(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .items
        .list(workspace_id, query.limit.clamp(1, 500), query.offset.max(0))
        .await?;
    Ok(Json(items))
}

/// Content updates queue a re-embed so the vector tracks the new text.
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.items.update_content(id, req).await?;

    if let Err(e) = state
        .jobs
        .queue(id, JobType::Embed, JobType::Embed.default_priority())
        .await
    {
        warn!(item_id = %id, error = %e, "Failed to queue re-embedding");
    }

    let item = state.items.fetch(id).await?;
    Ok(Json(ItemResponse::from(item)))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.items.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_response_hides_embedding() {
        let item = Item {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            kind: ItemKind::Note,
            title: "t".into(),
            body: None,
            summary: None,
            tags: vec![],
            metadata: json!({}),
            enrich_status: EnrichStatus::Embedded,
            embedding: Some(curio_core::Vector::from(vec![0.0; 4])),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let response = ItemResponse::from(item);
        assert!(response.has_embedding);
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("embedding").is_none());
    }

    #[test]
    fn test_list_query_defaults() {
        let query: ListQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query.limit, defaults::PAGE_LIMIT);
        assert_eq!(query.offset, 0);
    }
}
