//! Health and system endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

/// Liveness plus a database round-trip.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = sqlx_ping(&state).await;
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "database": db_ok,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn sqlx_ping(state: &AppState) -> bool {
    sqlx::query("SELECT 1")
        .execute(state.db.pool())
        .await
        .is_ok()
}
