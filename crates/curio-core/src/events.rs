//! Typed event frames for the chat turn stream.
//!
//! One user turn produces a sequence of [`ChatEvent`] frames delivered over a
//! continuously-flushed channel (SSE in the HTTP server). `done` is always the
//! terminal frame on every exit path — success, tool budget exhaustion, and
//! error alike — and is emitted exactly once.
//!
//! ## Wire Format (SSE)
//!
//! ```text
//! event: context
//! data: {"type":"context","items":[{"item_id":"…","score":0.83}]}
//!
//! event: text
//! data: {"type":"text","delta":"Vector search works by"}
//!
//! event: done
//! data: {"type":"done"}
//! ```

use serde::Serialize;
use uuid::Uuid;

/// A ranked item reference carried by the `context` frame, so a visualization
/// layer can light up the grounding set before generation finishes.
#[derive(Debug, Clone, Serialize)]
pub struct ContextRef {
    pub item_id: Uuid,
    pub score: f32,
}

/// One frame of the chat turn stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// A chunk of the assistant's answer text.
    Text { delta: String },
    /// Progress signal, e.g. which tool the model invoked.
    Status { message: String },
    /// Ranked grounding items for this turn, emitted before the first model
    /// call when retrieval produced a ranking.
    Context { items: Vec<ContextRef> },
    /// The turn failed. Followed by `done`.
    Error { message: String },
    /// Terminal frame. Always emitted, exactly once.
    Done,
}

impl ChatEvent {
    /// SSE event name for this frame.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Status { .. } => "status",
            Self::Context { .. } => "context",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(ChatEvent::Text { delta: "x".into() }.event_type(), "text");
        assert_eq!(
            ChatEvent::Status { message: "searching".into() }.event_type(),
            "status"
        );
        assert_eq!(ChatEvent::Context { items: vec![] }.event_type(), "context");
        assert_eq!(
            ChatEvent::Error { message: "boom".into() }.event_type(),
            "error"
        );
        assert_eq!(ChatEvent::Done.event_type(), "done");
    }

    #[test]
    fn test_wire_format_tags_frames() {
        let json = serde_json::to_string(&ChatEvent::Text { delta: "hi".into() }).unwrap();
        assert_eq!(json, r#"{"type":"text","delta":"hi"}"#);

        let json = serde_json::to_string(&ChatEvent::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }

    #[test]
    fn test_context_frame_carries_scores() {
        let id = Uuid::nil();
        let json = serde_json::to_string(&ChatEvent::Context {
            items: vec![ContextRef { item_id: id, score: 0.5 }],
        })
        .unwrap();
        assert!(json.contains("\"score\":0.5"));
        assert!(json.contains(&id.to_string()));
    }
}
