
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::Document;
use crate::{DocsError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 256;
pub const DEFAULT_OVERLAP: usize = 30;

/// A contiguous window of words taken from one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Words of the window joined by single spaces
    pub text: String,
    /// Identifier of the document the words came from
    pub source: String,
    /// The index of this chunk within its document
    pub index: usize,
}

impl Chunk {
    #[inline]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Configuration for word-window chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Number of words per chunk
    pub chunk_size: usize,
    /// Number of words shared by consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Fails unless `chunk_size > overlap >= 0`, which keeps the window stride positive
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(DocsError::InvalidConfiguration {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }
}

/// Split text into overlapping windows of `chunk_size` words
///
/// Windows start every `chunk_size - overlap` words until the start runs past
/// the last word, so the final window may be shorter than `chunk_size`.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    config.validate()?;

    let words = text.split_whitespace().collect::<Vec<_>>();
    let stride = config.stride();

    let chunks = (0..words.len())
        .step_by(stride)
        .map(|start| {
            let end = (start + config.chunk_size).min(words.len());
            words[start..end].join(" ")
        })
        .filter(|chunk| !chunk.trim().is_empty())
        .collect::<Vec<_>>();

    Ok(chunks)
}

/// Chunk a document, tagging every chunk with the document's identifier
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let chunks = chunk_text(&document.text, config)?
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            text,
            source: document.id.clone(),
            index,
        })
        .collect::<Vec<_>>();

    debug!(
        "Chunked document '{}' into {} chunks",
        document.id,
        chunks.len()
    );

    Ok(chunks)
}
