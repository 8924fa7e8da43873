//! Core data models shared by the builder, retriever, and restoration engine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RestoreError;

/// Sentinel rendered into prompts and CLI output when retrieval fails.
pub const CONTEXT_UNAVAILABLE: &str =
    "Context retrieval failed due to missing vector DB. Proceeding without external context.";

/// A corpus file loaded as one logical document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name relative to the corpus root, e.g. `history.txt`.
    pub source_id: String,
    pub path: PathBuf,
    pub body: String,
    pub modified_at: DateTime<Utc>,
}

/// A contiguous span of a source document; the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Char offset of the span within the source body.
    pub start: usize,
    pub char_len: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Top-k passages for a query, in descending score order.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub passages: Vec<ScoredChunk>,
}

impl RetrievedContext {
    /// Passage texts joined by a blank line.
    pub fn text(&self) -> String {
        self.passages
            .iter()
            .map(|p| p.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result of a best-effort retrieval. Never an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContextOutcome {
    /// Plain mode: retrieval was never attempted.
    NotRequested,
    Found(RetrievedContext),
    Unavailable { reason: String },
}

impl ContextOutcome {
    /// Context string if retrieval succeeded.
    pub fn context(&self) -> Option<String> {
        match self {
            ContextOutcome::Found(ctx) => Some(ctx.text()),
            _ => None,
        }
    }

    /// Context blob, or [`CONTEXT_UNAVAILABLE`] when retrieval failed.
    pub fn as_prompt_text(&self) -> String {
        match self {
            ContextOutcome::Found(ctx) => ctx.text(),
            ContextOutcome::NotRequested => String::new(),
            ContextOutcome::Unavailable { .. } => CONTEXT_UNAVAILABLE.to_string(),
        }
    }
}

/// Restoration register that conditions the prompt's tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Simple,
    Legal,
    Academic,
}

impl Style {
    pub const ALL: [Style; 3] = [Style::Simple, Style::Legal, Style::Academic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Simple => "simple",
            Style::Legal => "legal",
            Style::Academic => "academic",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Style::Simple),
            "legal" => Ok(Style::Legal),
            "academic" => Ok(Style::Academic),
            other => Err(RestoreError::InvalidArgument(format!(
                "unknown style '{}'. Use simple, legal, or academic.",
                other
            ))),
        }
    }
}

/// Context-free or retrieval-augmented restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestorationMode {
    #[default]
    Plain,
    Rag,
}

impl FromStr for RestorationMode {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(RestorationMode::Plain),
            "rag" => Ok(RestorationMode::Rag),
            other => Err(RestoreError::InvalidArgument(format!(
                "unknown mode '{}'. Use plain or rag.",
                other
            ))),
        }
    }
}

/// One restoration call, as issued by a front end.
#[derive(Debug, Clone)]
pub struct RestorationRequest {
    pub damaged_text: String,
    pub style: Style,
    pub mode: RestorationMode,
}

/// Generated reconstruction plus how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct Restoration {
    pub text: String,
    pub style: Style,
    pub mode: RestorationMode,
    pub context: ContextOutcome,
}

/// Per-document state owned by the orchestration layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub damaged: Option<String>,
    pub restored: Option<String>,
    pub context: Option<String>,
    pub style: Style,
}

impl DocumentRecord {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            ..Default::default()
        }
    }

    /// Fold a finished restoration into the record.
    pub fn apply(&mut self, damaged: &str, restoration: &Restoration) {
        self.damaged = Some(damaged.to_string());
        self.restored = Some(restoration.text.clone());
        self.context = restoration.context.context();
        self.style = restoration.style;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: "c".to_string(),
            source_id: "history.txt".to_string(),
            chunk_index: 0,
            text: text.to_string(),
            start: 0,
            char_len: text.chars().count(),
            hash: String::new(),
        }
    }

    #[test]
    fn test_style_parse_case_insensitive() {
        assert_eq!("Legal".parse::<Style>().unwrap(), Style::Legal);
        assert_eq!(" academic ".parse::<Style>().unwrap(), Style::Academic);
        assert!(matches!(
            "poetic".parse::<Style>(),
            Err(RestoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_style_display_roundtrip() {
        for style in Style::ALL {
            assert_eq!(style.to_string().parse::<Style>().unwrap(), style);
        }
    }

    #[test]
    fn test_context_text_joined_by_blank_line() {
        let ctx = RetrievedContext {
            passages: vec![
                ScoredChunk { chunk: chunk("first"), score: 0.9 },
                ScoredChunk { chunk: chunk("second"), score: 0.5 },
            ],
        };
        assert_eq!(ctx.text(), "first\n\nsecond");
    }

    #[test]
    fn test_unavailable_renders_sentinel() {
        let outcome = ContextOutcome::Unavailable {
            reason: "no index".to_string(),
        };
        assert_eq!(outcome.as_prompt_text(), CONTEXT_UNAVAILABLE);
        assert!(outcome.context().is_none());
    }

    #[test]
    fn test_record_apply() {
        let mut record = DocumentRecord::new("page-1.png");
        let restoration = Restoration {
            text: "The Anglo-Frisian settlers".to_string(),
            style: Style::Academic,
            mode: RestorationMode::Rag,
            context: ContextOutcome::Found(RetrievedContext {
                passages: vec![ScoredChunk { chunk: chunk("ctx"), score: 1.0 }],
            }),
        };
        record.apply("The [MASK] settlers", &restoration);
        assert_eq!(record.damaged.as_deref(), Some("The [MASK] settlers"));
        assert_eq!(record.restored.as_deref(), Some("The Anglo-Frisian settlers"));
        assert_eq!(record.context.as_deref(), Some("ctx"));
        assert_eq!(record.style, Style::Academic);
    }
}
