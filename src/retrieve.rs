//! Context retrieval over the persisted index.
//!
//! [`Retriever::retrieve`] reports every failure as a [`RetrievalError`];
//! [`Retriever::retrieve_or_fallback`] turns those into
//! [`ContextOutcome::Unavailable`] so restoration can continue without
//! context.
//!
//! # Caching
//!
//! With `[retrieval] cache = true` the loaded index is kept in memory.
//! Every call first reads the on-disk `build_id` (one row) and reloads
//! when it differs, so a rebuild is picked up by the next query.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use ecoscribe_core::embedding::{embed_one, Embedder};
use ecoscribe_core::error::RetrievalError;
use ecoscribe_core::index::{truncate_query, IndexMeta, VectorIndex};
use ecoscribe_core::models::{ContextOutcome, RetrievedContext};

use crate::config::Config;
use crate::store;

pub struct Retriever {
    index_file: PathBuf,
    embedder: Arc<dyn Embedder>,
    query_prefix_chars: usize,
    cache_enabled: bool,
    cache: RwLock<Option<Arc<VectorIndex>>>,
}

impl Retriever {
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index_file: config.index_file(),
            embedder,
            query_prefix_chars: config.retrieval.query_prefix_chars,
            cache_enabled: config.retrieval.cache,
            cache: RwLock::new(None),
        }
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    /// Top-`k` passages for `query`. `k` must be at least 1.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievedContext, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::ZeroTopK);
        }
        let query = truncate_query(query, self.query_prefix_chars);
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let index = self.index().await?;
        if index.is_empty() {
            return Err(RetrievalError::EmptyIndex);
        }
        index.check_compatible(self.embedder.model_name(), self.embedder.dims())?;

        let query_vec = embed_one(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))?;
        if query_vec.len() != index.meta().dims {
            return Err(RetrievalError::ModelMismatch {
                index: format!("{} ({} dims)", index.meta().model, index.meta().dims),
                provider: format!("{} ({} dims)", self.embedder.model_name(), query_vec.len()),
            });
        }

        let passages = index.search(&query_vec, k);
        tracing::debug!(
            k,
            found = passages.len(),
            top_score = passages.first().map(|p| p.score),
            "retrieved context"
        );
        Ok(RetrievedContext { passages })
    }

    /// Like [`retrieve`](Self::retrieve), but never fails.
    pub async fn retrieve_or_fallback(&self, query: &str, k: usize) -> ContextOutcome {
        match self.retrieve(query, k).await {
            Ok(ctx) => ContextOutcome::Found(ctx),
            Err(e) => {
                tracing::warn!(error = %e, "context retrieval unavailable, continuing without context");
                ContextOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Joined passages, or the unavailable-context sentinel.
    pub async fn context_text(&self, query: &str, k: usize) -> String {
        self.retrieve_or_fallback(query, k).await.as_prompt_text()
    }

    /// Metadata of the index on disk.
    pub async fn meta(&self) -> Result<IndexMeta, RetrievalError> {
        store::read_meta(&self.index_file).await
    }

    async fn index(&self) -> Result<Arc<VectorIndex>, RetrievalError> {
        if !self.cache_enabled {
            return Ok(Arc::new(store::load_index(&self.index_file).await?));
        }

        let on_disk = store::read_meta(&self.index_file).await?;

        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.meta().build_id == on_disk.build_id {
                return Ok(Arc::clone(cached));
            }
        }

        let mut slot = self.cache.write().await;
        // Another task may have reloaded while we waited for the lock.
        if let Some(cached) = slot.as_ref() {
            if cached.meta().build_id == on_disk.build_id {
                return Ok(Arc::clone(cached));
            }
        }

        let loaded = Arc::new(store::load_index(&self.index_file).await?);
        tracing::info!(
            build_id = %loaded.meta().build_id,
            chunks = loaded.len(),
            "loaded vector index"
        );
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}
