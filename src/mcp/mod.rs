//! MCP (Model Context Protocol) Server Implementation
//!
//! Exposes the retriever to agents as a single `query_dnd_books` tool over
//! JSON-RPC 2.0 on stdio.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

use std::sync::Arc;

use crate::retriever::Retriever;
pub use server::McpServer;
pub use tools::{QueryBooksHandler, query_dnd_books};

/// Build a server with the rulebook search tool registered
#[inline]
pub async fn create_server(retriever: Arc<Retriever>, default_k: usize) -> McpServer {
    let server = McpServer::new(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    server
        .register_tool(
            QueryBooksHandler::tool_definition(),
            QueryBooksHandler::new(retriever, default_k),
        )
        .await;
    server
}
