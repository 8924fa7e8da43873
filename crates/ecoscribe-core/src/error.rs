//! Error taxonomy for the restoration core.
//!
//! | Variant | Policy |
//! |---------|--------|
//! | [`RestoreError::InvalidArgument`] | surfaced immediately, never retried |
//! | [`RestoreError::RetrievalUnavailable`] | absorbed by the retriever fallback |
//! | [`RestoreError::GenerationFailure`] | surfaced to the user as-is |
//! | [`RestoreError::BuildFailure`] | fatal to the build, no partial index |

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for every restoration-core operation.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("context retrieval unavailable: {0}")]
    RetrievalUnavailable(#[from] RetrievalError),

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("index build failed: {0}")]
    BuildFailure(String),
}

/// Why context could not be retrieved.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no vector index at {}", .0.display())]
    MissingIndex(PathBuf),

    #[error("vector index is corrupt: {0}")]
    Corrupt(String),

    #[error("index was built with model '{index}' but the provider is '{provider}'")]
    ModelMismatch { index: String, provider: String },

    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error("vector index contains no chunks")]
    EmptyIndex,

    #[error("query is empty")]
    EmptyQuery,

    #[error("top_k must be at least 1")]
    ZeroTopK,
}

pub type Result<T, E = RestoreError> = std::result::Result<T, E>;
