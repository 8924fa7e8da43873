//! # EcoScribe Core
//!
//! Runtime-agnostic logic for restoring damaged document text: damage
//! simulation, recursive chunking, the in-memory vector index, prompt
//! templates, and the restoration engine.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Embedding
//! and generation backends are reached through the [`embedding::Embedder`]
//! and [`restore::Generator`] traits; concrete implementations and index
//! persistence live in the `ecoscribe` app crate.

pub mod chunk;
pub mod damage;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod prompt;
pub mod restore;
