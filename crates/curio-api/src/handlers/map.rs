//! 3D map endpoint: PCA positions plus similarity edges for a workspace.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use curio_core::{ItemRepository, ProjectedPoint, SimilarityEdge};
use curio_search::{build_default_edges, project};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MapResponse {
    pub points: Vec<ProjectedPoint>,
    pub edges: Vec<SimilarityEdge>,
}

/// Project all embedded items of a workspace into the visual space.
///
/// Edges are computed on the original embeddings, independent of the lossy
/// projection, so semantically close items stay connected on screen.
pub async fn workspace_map(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let vectors = state.items.embedded_vectors(workspace_id).await?;
    let points = project(&vectors);
    let edges = build_default_edges(&vectors);
    Ok(Json(MapResponse { points, edges }))
}
