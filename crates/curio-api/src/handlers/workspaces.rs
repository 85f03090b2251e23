//! Workspace CRUD (thin).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

pub async fn create_workspace(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Workspace name must not be empty".into()));
    }
    let id = state.db.workspaces.create(req.name.trim()).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "name": req.name.trim() })),
    ))
}

pub async fn list_workspaces(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let workspaces = state.db.workspaces.list().await?;
    Ok(Json(workspaces))
}

/// Deletion cascades to items, sessions, and turns at the schema level.
pub async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.workspaces.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
