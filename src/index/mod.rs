//! Exact nearest-neighbour search over squared Euclidean distance
//!
//! The index is built once from a batch of embeddings and never mutated;
//! callers replace it wholesale. Every query scans all entries, which is
//! O(n·d) and fine for corpora up to a few tens of thousands of chunks.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use crate::{DocsError, Result};

/// One search hit: insertion position and squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Immutable brute-force vector index
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    len: usize,
    // Row-major, `len * dimension` values
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from embeddings that all share one dimensionality
    #[inline]
    pub fn build(embeddings: Vec<Vec<f32>>) -> Result<Self> {
        let Some(first) = embeddings.first() else {
            return Err(DocsError::Index(
                "Cannot build an index from zero embeddings".to_string(),
            ));
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(DocsError::Index(
                "Cannot build an index from zero-dimensional embeddings".to_string(),
            ));
        }

        let len = embeddings.len();
        let mut data = Vec::with_capacity(len * dimension);
        for (position, embedding) in embeddings.into_iter().enumerate() {
            if embedding.len() != dimension {
                return Err(DocsError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            if !all_finite(&embedding) {
                return Err(DocsError::Index(format!(
                    "Embedding {} contains a NaN or infinite value",
                    position
                )));
            }
            data.extend(embedding);
        }

        Ok(Self {
            dimension,
            len,
            data,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `k` nearest entries, ascending by distance, ties by lower position
    ///
    /// `k` must be at least 1 and is clamped to the number of entries.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(DocsError::InvalidResultCount(k));
        }
        if query.len() != self.dimension {
            return Err(DocsError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if !all_finite(query) {
            return Err(DocsError::Index(
                "Query embedding contains a NaN or infinite value".to_string(),
            ));
        }

        let k = k.min(self.len);

        let mut neighbors = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: squared_euclidean(query, vector),
            })
            .collect::<Vec<_>>();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, compare_neighbors);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(compare_neighbors);

        Ok(neighbors)
    }
}

fn all_finite(vector: &[f32]) -> bool {
    vector.iter().all(|value| value.is_finite())
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}

#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}
