//! Query-time retrieval over the corpus


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::Result;
use crate::corpus::{Corpus, CorpusStats, QueryOutcome, RetrievedChunk};
use crate::documents::Document;

pub use crate::corpus::RebuildReport;

pub const DEFAULT_TOP_K: usize = 1;
pub const DEFAULT_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks retrieved when the caller does not ask for a specific count
    pub top_k: usize,
    /// Placed between chunk texts when building a context
    pub separator: String,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

/// Retrieved chunks ready to be handed to a generator
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalContext {
    pub chunks: Vec<RetrievedChunk>,
    separator: String,
}

impl RetrievalContext {
    /// Chunk texts in rank order, joined by the configured separator
    #[inline]
    pub fn joined(&self) -> String {
        self.chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextOutcome {
    EmptyCorpus,
    Context(RetrievalContext),
}

pub struct RetrievalService {
    corpus: Arc<Corpus>,
    config: RetrievalConfig,
}

impl RetrievalService {
    #[inline]
    pub fn new(corpus: Arc<Corpus>, config: RetrievalConfig) -> Self {
        Self { corpus, config }
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rebuild the corpus from `documents`, replacing whatever was indexed
    #[inline]
    pub fn train(&self, documents: Vec<Document>) -> Result<RebuildReport> {
        self.corpus.rebuild(documents)
    }

    /// Retrieve context for `question`, `k` defaulting to the configured `top_k`
    ///
    /// An explicit `k` of zero is rejected rather than producing an empty context.
    #[inline]
    pub fn answer_context(&self, question: &str, k: Option<usize>) -> Result<ContextOutcome> {
        let k = k.unwrap_or(self.config.top_k);
        debug!("Retrieving {} chunks of context", k);

        Ok(match self.corpus.query(question, k)? {
            QueryOutcome::EmptyCorpus => ContextOutcome::EmptyCorpus,
            QueryOutcome::Matches(chunks) => ContextOutcome::Context(RetrievalContext {
                chunks,
                separator: self.config.separator.clone(),
            }),
        })
    }

    /// Raw ranked results
    #[inline]
    pub fn search(&self, query: &str, k: usize) -> Result<QueryOutcome> {
        self.corpus.query(query, k)
    }

    #[inline]
    pub fn status(&self) -> CorpusStats {
        self.corpus.stats()
    }
}
