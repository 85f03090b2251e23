//! Tool registry for the dialogue loop.
//!
//! Tools are a closed, tagged set — dispatch never falls through on a bare
//! string. Every failure inside a tool, including an unknown name or invalid
//! arguments, is converted into an error string returned *as the tool
//! result*, so the model can reason about it instead of the turn aborting.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{
    EncodeInput, EncodeMode, Encoder, Error, Result, ToolCall, ToolDefinition, Vector,
};
use curio_search::HybridRanker;

/// The closed set of tools advertised to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Hybrid (lexical + vector) search over workspace items.
    SearchItems,
    /// Vector-only threshold search for semantically similar items.
    FindSimilarItems,
}

impl ToolKind {
    /// All registered tools.
    pub const ALL: [ToolKind; 2] = [ToolKind::SearchItems, ToolKind::FindSimilarItems];

    /// Wire name of this tool.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchItems => "search_items",
            Self::FindSimilarItems => "find_similar_items",
        }
    }

    /// Resolve a wire name to a registered tool.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// Schema advertised to the model.
    pub fn definition(&self) -> ToolDefinition {
        let description = match self {
            Self::SearchItems => {
                "Search the user's collection by keywords and meaning. \
                 Returns matching items as JSON."
            }
            Self::FindSimilarItems => {
                "Find items semantically similar to a description, even when \
                 no keywords overlap. Returns matching items as JSON."
            }
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look for"
                    }
                },
                "required": ["query"]
            }),
        }
    }
}

/// Executes tool calls against the retrieval layer.
pub struct ToolRegistry {
    encoder: Arc<dyn Encoder>,
    ranker: Arc<HybridRanker>,
}

impl ToolRegistry {
    /// Create a registry over the given search backends.
    pub fn new(encoder: Arc<dyn Encoder>, ranker: Arc<HybridRanker>) -> Self {
        Self { encoder, ranker }
    }

    /// Definitions of every registered tool, for the model request.
    pub fn definitions() -> Vec<ToolDefinition> {
        ToolKind::ALL.iter().map(ToolKind::definition).collect()
    }

    /// Execute one tool call. Never fails: every error becomes the returned
    /// result string.
    pub async fn execute(&self, workspace_id: Uuid, call: &ToolCall) -> String {
        match self.try_execute(workspace_id, call).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    subsystem = "chat",
                    component = "tools",
                    tool = %call.name,
                    error = %e,
                    "Tool call failed"
                );
                format!("Error: {}", e)
            }
        }
    }

    async fn try_execute(&self, workspace_id: Uuid, call: &ToolCall) -> Result<String> {
        let kind = ToolKind::from_name(&call.name)?;
        let query = call
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Tool {} requires a non-empty string 'query' argument",
                    call.name
                ))
            })?;

        debug!(
            subsystem = "chat",
            component = "tools",
            op = "execute",
            tool = kind.name(),
            workspace_id = %workspace_id,
            "Executing tool call"
        );

        match kind {
            ToolKind::SearchItems => self.search_items(workspace_id, query).await,
            ToolKind::FindSimilarItems => self.find_similar(workspace_id, query).await,
        }
    }

    async fn search_items(&self, workspace_id: Uuid, query: &str) -> Result<String> {
        let vector = self.encode_query(query).await;
        let candidates = self
            .ranker
            .search(
                workspace_id,
                query,
                vector.as_ref(),
                defaults::SEARCH_LIMIT as usize,
            )
            .await;

        let entries: Vec<_> = candidates
            .iter()
            .map(|c| {
                json!({
                    "item_id": c.item_id,
                    "title": c.title,
                    "snippet": c.snippet,
                    "score": c.fused_score,
                })
            })
            .collect();
        Ok(json!({ "items": entries }).to_string())
    }

    async fn find_similar(&self, workspace_id: Uuid, query: &str) -> Result<String> {
        let vector = self.encode_query(query).await.ok_or_else(|| {
            Error::Encoding("Encoder unavailable, similarity search is degraded".into())
        })?;

        let hits = self
            .ranker
            .similar(
                workspace_id,
                &vector,
                defaults::SIMILAR_ITEMS_THRESHOLD,
                defaults::SEARCH_LIMIT,
            )
            .await?;

        let entries: Vec<_> = hits
            .iter()
            .map(|h| {
                json!({
                    "item_id": h.item_id,
                    "title": h.title,
                    "snippet": h.snippet,
                    "similarity": h.score,
                })
            })
            .collect();
        Ok(json!({ "items": entries }).to_string())
    }

    async fn encode_query(&self, query: &str) -> Option<Vector> {
        self.encoder
            .encode_one(EncodeInput::text(query), EncodeMode::Query)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ranker_over, seed_embedded_item};
    use curio_core::testing::MemoryItemRepository;
    use curio_inference::mock::axis_embedding;
    use curio_inference::MockEncoder;

    const DIM: usize = 16;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn registry(encoder: MockEncoder, items: Arc<MemoryItemRepository>) -> ToolRegistry {
        ToolRegistry::new(Arc::new(encoder), Arc::new(ranker_over(items)))
    }

    #[test]
    fn test_registry_is_closed() {
        assert!(ToolKind::from_name("search_items").is_ok());
        assert!(matches!(
            ToolKind::from_name("delete_everything"),
            Err(Error::UnknownTool(_))
        ));
    }

    #[test]
    fn test_definitions_cover_all_tools() {
        let defs = ToolRegistry::definitions();
        assert_eq!(defs.len(), ToolKind::ALL.len());
        assert!(defs.iter().all(|d| d.input_schema["required"][0] == "query"));
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error_string() {
        let items = Arc::new(MemoryItemRepository::new());
        let reg = registry(MockEncoder::new(DIM), items);

        let result = reg
            .execute(Uuid::new_v4(), &call("frobnicate", json!({"query": "x"})))
            .await;
        assert_eq!(result, "Error: Unknown tool: frobnicate");
    }

    #[tokio::test]
    async fn test_missing_query_returns_error_string() {
        let items = Arc::new(MemoryItemRepository::new());
        let reg = registry(MockEncoder::new(DIM), items);

        let result = reg
            .execute(Uuid::new_v4(), &call("search_items", json!({})))
            .await;
        assert!(result.starts_with("Error:"));
        assert!(result.contains("query"));
    }

    #[tokio::test]
    async fn test_search_items_returns_json_summaries() {
        let items = Arc::new(MemoryItemRepository::new());
        let encoder = MockEncoder::new(DIM);
        let ws = Uuid::new_v4();
        seed_embedded_item(&items, ws, "Rust notes", "ownership and borrowing",
            encoder.vector_for("rust")).await;

        let reg = registry(encoder, items);
        let result = reg
            .execute(ws, &call("search_items", json!({"query": "rust"})))
            .await;

        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["items"][0]["title"], "Rust notes");
        assert!(parsed["items"][0]["score"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_find_similar_applies_strict_threshold() {
        let items = Arc::new(MemoryItemRepository::new());
        let encoder = MockEncoder::new(DIM);
        let ws = Uuid::new_v4();
        seed_embedded_item(&items, ws, "Close match", "body", encoder.vector_for("topic")).await;
        seed_embedded_item(&items, ws, "Far away", "body",
            Vector::from(axis_embedding(3, DIM))).await;

        let reg = registry(encoder, items);
        let result = reg
            .execute(ws, &call("find_similar_items", json!({"query": "topic"})))
            .await;

        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        let titles: Vec<_> = parsed["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["title"].as_str().unwrap().to_string())
            .collect();
        assert!(titles.contains(&"Close match".to_string()));
        assert!(!titles.contains(&"Far away".to_string()));
    }

    #[tokio::test]
    async fn test_find_similar_degraded_encoder_is_error_string() {
        let items = Arc::new(MemoryItemRepository::new());
        let reg = registry(MockEncoder::new(DIM).unavailable(), items);

        let result = reg
            .execute(Uuid::new_v4(), &call("find_similar_items", json!({"query": "x"})))
            .await;
        assert!(result.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_search_items_works_without_vector() {
        // A degraded encoder still allows lexical-only search.
        let items = Arc::new(MemoryItemRepository::new());
        let ws = Uuid::new_v4();
        seed_embedded_item(&items, ws, "Plain note", "mentions keyword",
            Vector::from(axis_embedding(0, DIM))).await;

        let reg = registry(MockEncoder::new(DIM).unavailable(), items);
        let result = reg
            .execute(ws, &call("search_items", json!({"query": "keyword"})))
            .await;

        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["items"][0]["title"], "Plain note");
    }
}
