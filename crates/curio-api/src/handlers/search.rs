//! Workspace search endpoint: hybrid fusion by default, vector-only
//! threshold search via `mode=similar`.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{EncodeInput, EncodeMode, Encoder, Error};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Similar,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: i64,
    #[serde(default)]
    pub mode: SearchMode,
}

fn default_k() -> i64 {
    defaults::SEARCH_LIMIT
}

pub async fn search_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".into()));
    }
    let k = query.k.clamp(1, defaults::RANK_CANDIDATE_CAP);

    let vector = state
        .encoder
        .encode_one(EncodeInput::text(query.q.clone()), EncodeMode::Query)
        .await;

    match query.mode {
        SearchMode::Hybrid => {
            // A missing vector degrades to a lexical-only fusion.
            let candidates = state
                .ranker
                .search(workspace_id, &query.q, vector.as_ref(), k as usize)
                .await;
            Ok(Json(serde_json::json!({ "results": candidates })))
        }
        SearchMode::Similar => {
            let vector = vector.ok_or_else(|| {
                Error::Encoding("Encoder unavailable, similarity search is degraded".into())
            })?;
            let hits = state
                .ranker
                .similar(workspace_id, &vector, defaults::SIMILAR_ITEMS_THRESHOLD, k)
                .await?;
            Ok(Json(serde_json::json!({ "results": hits })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_query_defaults_to_hybrid() {
        let query: SearchQuery = serde_json::from_value(json!({"q": "rust"})).unwrap();
        assert_eq!(query.mode, SearchMode::Hybrid);
        assert_eq!(query.k, defaults::SEARCH_LIMIT);
    }

    #[test]
    fn test_search_mode_parses_similar() {
        let query: SearchQuery =
            serde_json::from_value(json!({"q": "rust", "mode": "similar"})).unwrap();
        assert_eq!(query.mode, SearchMode::Similar);
    }
}
