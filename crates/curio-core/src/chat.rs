//! Chat model wire vocabulary.
//!
//! Provider-neutral message, tool, and streaming types shared by the chat
//! backend client and the dialogue loop. The HTTP client in curio-inference
//! maps these onto its provider's request format.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Message role in a model conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A part of possibly multimodal message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Image referenced by a fetchable HTTP(S) URL.
    ImageUrl { url: String },
}

/// A message in the model context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentPart>,
    /// Tool calls issued by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `Tool` role messages: which call this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Create a plain-text user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: vec![ContentPart::Text { text: text.into() }],
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message with trailing image blocks.
    pub fn user_with_images(text: impl Into<String>, image_urls: &[String]) -> Self {
        let mut content = vec![ContentPart::Text { text: text.into() }];
        content.extend(
            image_urls
                .iter()
                .map(|url| ContentPart::ImageUrl { url: url.clone() }),
        );
        Self {
            role: ChatRole::User,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: vec![ContentPart::Text { text: text.into() }],
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message that carries tool calls.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: Vec::new(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Create a tool-result message answering one tool call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: vec![ContentPart::Text { text: content.into() }],
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Concatenated text content of this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: JsonValue,
}

/// Declaration of a callable tool, advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: JsonValue,
}

/// A complete chat request: system text, message list, tool schemas.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Non-streaming model response.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatCompletion {
    /// Whether the model requested tool execution this round.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One unit of a streamed model response.
///
/// Some providers emit tool calls *after* partial text within the same
/// streamed round, so consumers must be prepared for a `ToolCall` delta at
/// any point and retract buffered text when one appears.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    Text(String),
    ToolCall(ToolCall),
}
