//! # EcoScribe
//!
//! Restoration of damaged historical-document text with retrieval-augmented
//! generation.
//!
//! OCR output of old documents is often incomplete. EcoScribe fills the
//! gaps with a generative model, optionally grounded in passages retrieved
//! from a reference corpus that was indexed ahead of time.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  corpus/   │──▶│ build: split │──▶│ index.sqlite │
//! │  *.txt     │   │  + embed     │   │  (vectors)   │
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ retrieve (top-k)
//!                                            ▼
//!  damaged text ─────────────────────▶ ┌──────────────┐
//!                                      │   restorer   │──▶ restored text
//!  style ────────────────────────────▶ │ prompt + LLM │
//!                                      └──────────────┘
//! ```
//!
//! The runtime-agnostic pieces (damage simulation, chunking, the in-memory
//! index, prompts, the restoration engine) live in `ecoscribe-core`. This
//! crate adds configuration, providers, persistence, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! ecoscribe index build                        # index ./knowledge/*.txt
//! ecoscribe damage page.txt --ratio 0.2        # simulate damage
//! ecoscribe restore damaged.txt --mode rag --style academic
//! ecoscribe explain restored.txt --token Mercian
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Reference corpus scanning |
//! | [`build`] | Offline index builder |
//! | [`db`] | SQLite connections and schema |
//! | [`store`] | Index persistence |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generative model clients |
//! | [`retrieve`] | Context retrieval with fallback |
//! | [`service`] | Front-end facade |

pub mod build;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod retrieve;
pub mod service;
pub mod store;
