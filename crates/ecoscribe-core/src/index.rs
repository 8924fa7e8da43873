//! In-memory vector index over embedded chunks.
//!
//! A [`VectorIndex`] is the loaded form of a persisted index: every chunk
//! paired with exactly one embedding, plus the [`IndexMeta`] recorded at
//! build time. Search is brute-force cosine similarity, which is exact
//! and fast enough for reference corpora of a few thousand chunks.
//!
//! The index is immutable once constructed; rebuilding is the only way to
//! change its contents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::error::RetrievalError;
use crate::models::{Chunk, ScoredChunk};

/// Metadata recorded when an index is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Random id regenerated by every build; used to detect rebuilds.
    pub build_id: String,
    pub model: String,
    pub dims: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: DateTime<Utc>,
    pub source_count: usize,
    pub chunk_count: usize,
}

/// A chunk and its embedding.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    meta: IndexMeta,
    entries: Vec<IndexedChunk>,
    /// `(source_id, chunk_index)` → position in `entries`.
    positions: HashMap<(String, i64), usize>,
}

impl VectorIndex {
    /// Assemble an index, checking that every embedding has `meta.dims`
    /// components.
    pub fn new(meta: IndexMeta, entries: Vec<IndexedChunk>) -> Result<Self, RetrievalError> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != meta.dims) {
            return Err(RetrievalError::Corrupt(format!(
                "chunk {} has {} dims, index declares {}",
                bad.chunk.id,
                bad.embedding.len(),
                meta.dims
            )));
        }

        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.chunk.source_id.clone(), e.chunk.chunk_index), i))
            .collect();

        Ok(Self {
            meta,
            entries,
            positions,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    /// Fails if `model`/`dims` differ from what the index was built with.
    pub fn check_compatible(&self, model: &str, dims: usize) -> Result<(), RetrievalError> {
        if self.meta.model != model || self.meta.dims != dims {
            return Err(RetrievalError::ModelMismatch {
                index: format!("{} ({} dims)", self.meta.model, self.meta.dims),
                provider: format!("{} ({} dims)", model, dims),
            });
        }
        Ok(())
    }

    /// Top-`k` chunks by cosine similarity, best first.
    ///
    /// Ties are broken by `(source_id, chunk_index)` so results are stable.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_vec, &e.embedding), e))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.source_id.cmp(&b.chunk.source_id))
                .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(score, e)| ScoredChunk {
                chunk: e.chunk.clone(),
                score,
            })
            .collect()
    }

    /// The chunks immediately before and after `chunk` in its source.
    pub fn neighbors(&self, chunk: &Chunk) -> (Option<&Chunk>, Option<&Chunk>) {
        let lookup = |index: i64| {
            self.positions
                .get(&(chunk.source_id.clone(), index))
                .map(|&i| &self.entries[i].chunk)
        };
        (lookup(chunk.chunk_index - 1), lookup(chunk.chunk_index + 1))
    }
}

/// First `max_chars` characters of `query`.
pub fn truncate_query(query: &str, max_chars: usize) -> &str {
    match query.char_indices().nth(max_chars) {
        Some((byte, _)) => &query[..byte],
        None => query,
    }
}
