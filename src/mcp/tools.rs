//! MCP Tools Implementation
//!
//! The `query_dnd_books` tool and the plain-text rendering of its results.

use crate::Result;
use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use crate::retriever::{Retriever, SearchHit};
use async_trait::async_trait;
use itertools::Itertools;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, error};

pub const QUERY_TOOL_NAME: &str = "query_dnd_books";

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Accepted keys of the tool's input object
const ARGUMENT_NAMES: [&str; 2] = ["query", "k"];

/// Run a search and render the hits for an agent to read and cite
#[inline]
pub fn query_dnd_books(retriever: &Retriever, query: &str, k: usize) -> Result<String> {
    let hits = retriever.search(query, k)?;
    Ok(render_hits(query, &hits))
}

/// Render hits as numbered blocks, best first
#[inline]
pub fn render_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No relevant passages found for \"{}\".", query.trim());
    }

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let location = match hit.page {
                Some(page) => format!("{}, page {}", hit.document_id, page),
                None => hit.document_id.clone(),
            };
            format!(
                "[{}] {} — {} (score {:.3})\n{}",
                i + 1,
                hit.id,
                location,
                hit.score,
                hit.text
            )
        })
        .join(BLOCK_SEPARATOR)
}

/// Rulebook search tool handler
pub struct QueryBooksHandler {
    retriever: Arc<Retriever>,
    default_k: usize,
}

impl QueryBooksHandler {
    /// Create a new query handler; `default_k` applies when the caller omits `k`
    #[inline]
    pub fn new(retriever: Arc<Retriever>, default_k: usize) -> Self {
        Self {
            retriever,
            default_k: default_k.max(1),
        }
    }

    /// Create the query_dnd_books tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: QUERY_TOOL_NAME.to_string(),
            description: Some(
                "Searches the local D&D book library to find relevant information.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language question or keywords"
                    },
                    "k": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of passages to return"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    fn parse_arguments(&self, arguments: Option<&Map<String, Value>>) -> McpResult<(String, usize)> {
        let invalid = |message: &str| McpError::InvalidToolParameters {
            tool: QUERY_TOOL_NAME.to_string(),
            message: message.to_string(),
        };

        if let Some(unknown) = arguments
            .into_iter()
            .flat_map(Map::keys)
            .find(|key| !ARGUMENT_NAMES.contains(&key.as_str()))
        {
            return Err(invalid(format!("unknown argument '{unknown}'").as_str()));
        }

        let query = arguments
            .and_then(|args| args.get("query"))
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| invalid("'query' is required and must be a non-empty string"))?;

        let k = match arguments.and_then(|args| args.get("k")) {
            None | Some(Value::Null) => self.default_k,
            Some(value) => value
                .as_u64()
                .filter(|k| *k >= 1)
                .and_then(|k| usize::try_from(k).ok())
                .ok_or_else(|| invalid("'k' must be an integer of at least 1"))?,
        };

        Ok((query.to_string(), k))
    }
}

#[async_trait]
impl ToolHandler for QueryBooksHandler {
    #[inline]
    async fn handle(&self, arguments: Option<Map<String, Value>>) -> McpResult<CallToolResult> {
        let (query, k) = self.parse_arguments(arguments.as_ref())?;
        debug!("Searching books: query='{}', k={}", query, k);

        let retriever = Arc::clone(&self.retriever);
        let outcome = tokio::task::spawn_blocking(move || query_dnd_books(&retriever, &query, k))
            .await
            .map_err(|e| McpError::InternalError {
                message: format!("Search task failed: {e}"),
            })?;

        match outcome {
            Ok(text) => Ok(CallToolResult::text(text)),
            Err(e) => {
                error!("Error performing search: {}", e);
                Ok(CallToolResult::error(format!("Search error: {e}")))
            }
        }
    }
}
