//! # curio-inference
//!
//! Service clients for the two model backends curio consumes:
//! - [`EncoderClient`] — the multimodal embedding service (degrades to null
//!   vectors, never errors)
//! - [`ChatClient`] — an OpenAI-compatible chat completion service with tool
//!   calls and token streaming
//!
//! Plus deterministic mock backends for testing the retrieval and dialogue
//! layers without live services.

pub mod chat;
pub mod encoder;
pub mod mock;
pub mod streaming;

// Re-export core types
pub use curio_core::*;

pub use chat::{ChatClient, ChatConfig, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL};
pub use encoder::{EncoderClient, DEFAULT_ENCODER_MODEL, DEFAULT_ENCODER_URL};
pub use mock::{MockChatModel, MockEncoder};
pub use streaming::parse_delta_stream;
