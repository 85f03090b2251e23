//! Chat model service client.
//!
//! Talks to an OpenAI-compatible chat completion API: non-streaming requests
//! for tool-call detection, streaming requests for the final answer round.
//! Unlike the encoder, chat failures are primary-path failures and surface as
//! errors; the dialogue loop catches them at the top of the turn.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use curio_core::defaults;
use curio_core::{
    ChatBackend, ChatCompletion, ChatMessage, ChatRequest, ChatRole, ContentPart, DeltaStream,
    Error, Result, ToolCall,
};

use crate::streaming::parse_delta_stream;

/// Default chat service endpoint.
pub const DEFAULT_CHAT_URL: &str = "https://api.chat.example.com/v1";

/// Default generation model.
pub const DEFAULT_CHAT_MODEL: &str = "chat-large";

/// Configuration for the chat client.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the chat completion API.
    pub base_url: String,
    /// Bearer token (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model name sent with every request.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_URL.to_string(),
            api_key: None,
            model: DEFAULT_CHAT_MODEL.to_string(),
            timeout_secs: defaults::CHAT_TIMEOUT_SECS,
        }
    }
}

/// HTTP client for the chat model service.
pub struct ChatClient {
    client: Client,
    config: ChatConfig,
}

impl ChatClient {
    /// Create a new chat client with the given configuration.
    pub fn new(config: ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::ChatModel(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "chat",
            base_url = %config.base_url,
            model = %config.model,
            "Initializing chat client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CURIO_CHAT_URL` | `https://api.chat.example.com/v1` |
    /// | `CURIO_CHAT_API_KEY` | unset |
    /// | `CURIO_CHAT_MODEL` | `chat-large` |
    /// | `CURIO_CHAT_TIMEOUT` | `300` |
    pub fn from_env() -> Result<Self> {
        let config = ChatConfig {
            base_url: std::env::var("CURIO_CHAT_URL")
                .unwrap_or_else(|_| DEFAULT_CHAT_URL.to_string()),
            api_key: std::env::var("CURIO_CHAT_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("CURIO_CHAT_MODEL")
                .unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string()),
            timeout_secs: std::env::var("CURIO_CHAT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::CHAT_TIMEOUT_SECS),
        };
        Self::new(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn build_request(&self, req: &ChatRequest, stream: bool) -> WireRequest {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.system.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: Some(WireContent::Text(req.system.clone())),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.extend(req.messages.iter().map(wire_message));

        WireRequest {
            model: self.config.model.clone(),
            messages,
            tools: req
                .tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireFunctionDef {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect(),
            stream,
        }
    }

    async fn send(&self, req: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&self.build_request(req, stream));

        if let Some(ref api_key) = self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::ChatModel(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ChatModel(format!(
                "Chat service returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion> {
        debug!(
            subsystem = "inference",
            component = "chat",
            op = "complete",
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            "Requesting completion"
        );

        let response = self.send(req, false).await?;
        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| Error::ChatModel(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::ChatModel("Response contained no choices".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(JsonValue::Null),
            })
            .collect();

        Ok(ChatCompletion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    async fn stream(&self, req: &ChatRequest) -> Result<DeltaStream> {
        debug!(
            subsystem = "inference",
            component = "chat",
            op = "stream",
            message_count = req.messages.len(),
            "Requesting streamed completion"
        );

        let response = self.send(req, true).await?;
        Ok(parse_delta_stream(response.bytes_stream()))
    }
}

fn wire_message(msg: &ChatMessage) -> WireMessage {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    };

    // Plain-text messages serialize as a bare string; anything multimodal
    // becomes a content-part array.
    let content = if msg.content.is_empty() {
        None
    } else if msg.content.len() == 1 {
        match &msg.content[0] {
            ContentPart::Text { text } => Some(WireContent::Text(text.clone())),
            part => Some(WireContent::Parts(vec![wire_part(part)])),
        }
    } else {
        Some(WireContent::Parts(msg.content.iter().map(wire_part).collect()))
    };

    WireMessage {
        role,
        content,
        tool_calls: msg
            .tool_calls
            .iter()
            .map(|tc| WireToolCall {
                id: tc.id.clone(),
                kind: "function".to_string(),
                function: WireFunctionCall {
                    name: tc.name.clone(),
                    arguments: tc.arguments.to_string(),
                },
            })
            .collect(),
        tool_call_id: msg.tool_call_id.clone(),
    }
}

fn wire_part(part: &ContentPart) -> WirePart {
    match part {
        ContentPart::Text { text } => WirePart::Text { text: text.clone() },
        ContentPart::ImageUrl { url } => WirePart::ImageUrl {
            image_url: WireImageUrl { url: url.clone() },
        },
    }
}

// Wire format types (OpenAI-compatible).

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: JsonValue,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object, as the wire format specifies.
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}
