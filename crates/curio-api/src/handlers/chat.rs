//! Chat turn endpoint: one user message in, a typed SSE frame stream out.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use curio_core::defaults;
use curio_core::SessionRepository;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
}

/// Run one conversational turn against a session.
///
/// Frames (`text`, `status`, `context`, `error`, `done`) are flushed as they
/// are produced; `done` is always the terminal frame, on every exit path. If
/// the client disconnects, the turn keeps running to completion but its
/// frames are discarded.
pub async fn chat_turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ChatTurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".into()));
    }
    let session = state.sessions.fetch(session_id).await?;

    let (tx, rx) = mpsc::channel(defaults::CHAT_CHANNEL_CAPACITY);
    let turn_loop = state.turn_loop();
    tokio::spawn(async move {
        turn_loop
            .run_turn(session.workspace_id, session_id, &req.message, tx)
            .await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let frame = Event::default()
            .event(event.event_type())
            .data(serde_json::to_string(&event).unwrap_or_default());
        Ok::<Event, Infallible>(frame)
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
