//! The in-memory corpus: chunks, their embeddings, and the index over them
//!
//! State lives in an immutable [`CorpusSnapshot`] behind an `Arc`. A rebuild
//! prepares a complete new snapshot without holding the publish lock and then
//! swaps the pointer, so readers see either the old corpus or the new one.
//! Rebuilds are serialized against each other; queries never wait on them.


use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::documents::Document;
use crate::embeddings::chunking::{Chunk, ChunkingConfig, chunk_document};
use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::{DocsError, Result};

/// Brute-force search gets slow past this many chunks
const LARGE_CORPUS_WARNING: usize = 50_000;

/// A chunk returned from a query, with its distance to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    #[serde(rename = "chunk_text")]
    pub text: String,
    #[serde(rename = "source_document_id")]
    pub source: String,
    pub distance: f32,
    #[serde(skip)]
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Nothing has been indexed
    EmptyCorpus,
    Matches(Vec<RetrievedChunk>),
}

/// Summary of a successful rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub indexed_chunk_count: usize,
    pub document_count: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub chunk_count: usize,
    pub documents: Vec<String>,
    pub dimension: Option<usize>,
    pub built_at: Option<DateTime<Utc>>,
}

/// A built index together with the chunks it was built from
///
/// Index position `i` always refers to `chunks[i]`.
#[derive(Debug, Clone)]
pub struct IndexedCorpus {
    index: VectorIndex,
    chunks: Vec<Chunk>,
    documents: Vec<String>,
    built_at: DateTime<Utc>,
}

impl IndexedCorpus {
    #[inline]
    pub fn new(index: VectorIndex, chunks: Vec<Chunk>) -> Result<Self> {
        if index.len() != chunks.len() {
            return Err(DocsError::Index(format!(
                "Index has {} entries but {} chunks were supplied",
                index.len(),
                chunks.len()
            )));
        }

        let mut documents: Vec<String> = Vec::new();
        for chunk in &chunks {
            if documents.last() != Some(&chunk.source) {
                documents.push(chunk.source.clone());
            }
        }

        Ok(Self {
            index,
            chunks,
            documents,
            built_at: Utc::now(),
        })
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Identifiers of the documents that contributed chunks, in index order
    #[inline]
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let neighbors = self.index.search(query, k)?;

        neighbors
            .into_iter()
            .map(|neighbor| {
                let chunk = self.chunks.get(neighbor.position).ok_or_else(|| {
                    DocsError::Index(format!(
                        "Search returned position {} outside of {} chunks",
                        neighbor.position,
                        self.chunks.len()
                    ))
                })?;
                Ok(RetrievedChunk {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    distance: neighbor.distance,
                    position: neighbor.position,
                })
            })
            .collect()
    }
}

/// One published state of the corpus
#[derive(Debug, Clone)]
pub enum CorpusSnapshot {
    Empty,
    Ready(IndexedCorpus),
}

impl CorpusSnapshot {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Ready(corpus) => corpus.chunks.len(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::Ready(corpus) => Some(corpus.index.dimension()),
        }
    }

    /// Search this snapshot with an already computed query embedding
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<QueryOutcome> {
        match self {
            Self::Empty => Ok(QueryOutcome::EmptyCorpus),
            Self::Ready(corpus) => corpus.search(query, k).map(QueryOutcome::Matches),
        }
    }

    #[inline]
    pub fn stats(&self) -> CorpusStats {
        match self {
            Self::Empty => CorpusStats {
                chunk_count: 0,
                documents: Vec::new(),
                dimension: None,
                built_at: None,
            },
            Self::Ready(corpus) => CorpusStats {
                chunk_count: corpus.chunks.len(),
                documents: corpus.documents.clone(),
                dimension: Some(corpus.index.dimension()),
                built_at: Some(corpus.built_at),
            },
        }
    }
}

pub struct Corpus {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    current: RwLock<Arc<CorpusSnapshot>>,
    rebuild_lock: Mutex<()>,
}

impl Corpus {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self {
            embedder,
            chunking,
            current: RwLock::new(Arc::new(CorpusSnapshot::Empty)),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// The currently published snapshot
    #[inline]
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[inline]
    pub fn stats(&self) -> CorpusStats {
        self.snapshot().stats()
    }

    /// Replace the corpus with one derived from `documents`
    ///
    /// All or nothing: on error the previously published snapshot stays in
    /// place and the cause is wrapped in [`DocsError::Rebuild`].
    #[inline]
    pub fn rebuild(&self, documents: Vec<Document>) -> Result<RebuildReport> {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        info!("Rebuilding corpus from {} documents", documents.len());

        match self.build_snapshot(&documents) {
            Ok(snapshot) => {
                let report = RebuildReport {
                    indexed_chunk_count: snapshot.chunk_count(),
                    document_count: documents.len(),
                    dimension: snapshot.dimension(),
                };
                self.publish(snapshot);
                info!(
                    "Published corpus with {} chunks from {} documents",
                    report.indexed_chunk_count, report.document_count
                );
                Ok(report)
            }
            Err(e) => {
                warn!("Rebuild failed, keeping previous corpus: {}", e);
                Err(DocsError::Rebuild(Box::new(e)))
            }
        }
    }

    /// Retrieve the `k` chunks nearest to `text`
    ///
    /// `k` must be at least 1, even when the corpus is empty.
    #[inline]
    pub fn query(&self, text: &str, k: usize) -> Result<QueryOutcome> {
        if k == 0 {
            return Err(DocsError::InvalidResultCount(k));
        }

        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            debug!("Query against empty corpus");
            return Ok(QueryOutcome::EmptyCorpus);
        }

        let embedding = self.embedder.embed_query(text)?;
        snapshot.search(&embedding, k)
    }

    fn build_snapshot(&self, documents: &[Document]) -> Result<CorpusSnapshot> {
        self.chunking.validate()?;

        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(chunk_document(document, &self.chunking)?);
        }

        if chunks.is_empty() {
            debug!("No chunks produced, corpus will be empty");
            return Ok(CorpusSnapshot::Empty);
        }

        if chunks.len() > LARGE_CORPUS_WARNING {
            warn!(
                "Indexing {} chunks; exhaustive search may become slow",
                chunks.len()
            );
        }

        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let embeddings = self.embedder.embed(&texts)?;

        if embeddings.len() != chunks.len() {
            return Err(DocsError::Embedding(format!(
                "Embedder returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let index = VectorIndex::build(embeddings)?;
        debug!(
            "Built index with {} entries of dimension {}",
            index.len(),
            index.dimension()
        );

        IndexedCorpus::new(index, chunks).map(CorpusSnapshot::Ready)
    }

    fn publish(&self, snapshot: CorpusSnapshot) {
        let snapshot = Arc::new(snapshot);
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = snapshot;
    }
}
