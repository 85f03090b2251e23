//! # curio-core
//!
//! Core types, traits, and abstractions for the curio library.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other curio crates depend on.

pub mod chat;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod testing;
pub mod traits;

// Re-export commonly used types at crate root
pub use chat::{
    ChatCompletion, ChatMessage, ChatRequest, ChatRole, ContentPart, StreamDelta, ToolCall,
    ToolDefinition,
};
pub use error::{Error, Result};
pub use events::{ChatEvent, ContextRef};
pub use models::*;
pub use traits::*;
