use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocsError>;

#[derive(Error, Debug)]
pub enum DocsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Invalid chunking configuration: chunk_size ({chunk_size}) must be positive and greater than overlap ({overlap})"
    )]
    InvalidConfiguration { chunk_size: usize, overlap: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Invalid result count: {0} (at least one result must be requested)")]
    InvalidResultCount(usize),

    #[error("Rebuild failed: {0}")]
    Rebuild(#[source] Box<DocsError>),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl DocsError {
    /// The error underneath any `Rebuild` wrapping
    #[inline]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Rebuild(inner) => inner.root_cause(),
            other => other,
        }
    }
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod documents;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod mcp;
pub mod retrieval;
