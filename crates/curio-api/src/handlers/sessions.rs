//! Conversation session CRUD (thin).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use curio_core::{SessionRepository, Turn, TurnRepository};

use crate::error::ApiError;
use crate::state::AppState;

/// Full replay window served to clients; the model's own window is narrower.
const SESSION_TURN_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_title() -> String {
    "New conversation".to_string()
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub has_embedding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.workspaces.exists(workspace_id).await? {
        return Err(ApiError::NotFound(format!("workspace {}", workspace_id)));
    }
    let id = state.sessions.create(workspace_id, req.title.trim()).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "title": req.title.trim() })),
    ))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.fetch(id).await?;
    let turns = state.turns.recent(id, SESSION_TURN_LIMIT).await?;
    Ok(Json(SessionResponse {
        id: session.id,
        workspace_id: session.workspace_id,
        title: session.title,
        has_embedding: session.embedding.is_some(),
        created_at: session.created_at,
        updated_at: session.updated_at,
        turns,
    }))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.list(workspace_id).await?;
    Ok(Json(sessions))
}

/// Deletion cascades to the session's turns.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
