//! # curio-chat
//!
//! The conversational core of curio: assembling grounding context from the
//! retrieval layer, aggregating session memory, and running the bounded,
//! streaming, tool-calling dialogue loop against the chat model.
//!
//! ## Turn lifecycle
//!
//! ```text
//! user message
//!   → ContextRetriever (hybrid items + past sessions, or recency fallback)
//!   → TurnLoop: AwaitingModel → (ToolCallPending → ToolsExecuting)* → Streaming → Done
//!   → assistant turn persisted, SessionMemory re-embedded
//! ```

pub mod memory;
pub mod retriever;
pub mod tools;
pub mod turn_loop;

// Re-export core types
pub use curio_core::*;

pub use memory::SessionMemory;
pub use retriever::{ContextRetriever, RetrievedContext};
pub use tools::{ToolKind, ToolRegistry};
pub use turn_loop::{TurnLoop, TurnLoopConfig};
