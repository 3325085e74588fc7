// Embeddings module
// Word-window chunking and the embedding boundary (Ollama-backed by default)

pub mod chunking;
pub mod ollama;

pub use chunking::{Chunk, ChunkingConfig, chunk_document, chunk_text};
pub use ollama::OllamaClient;

use crate::{DocsError, Result};

/// Maps text to fixed-length vectors
///
/// Implementations return exactly one vector per input, in input order. Every
/// vector returned within one process run is expected to have the same length.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    #[inline]
    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed(&[query.to_string()])?;
        if embeddings.len() != 1 {
            return Err(DocsError::Embedding(format!(
                "Expected 1 query embedding, got {}",
                embeddings.len()
            )));
        }
        Ok(embeddings.remove(0))
    }
}
