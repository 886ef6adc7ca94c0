use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index version mismatch: expected {expected}, found {found}")]
    IndexVersionMismatch { expected: String, found: String },

    #[error("Index not loaded; run `dnd-books-mcp build` and load the index first")]
    IndexNotLoaded,

    #[error("Index artifact is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod mcp;
pub mod retriever;
