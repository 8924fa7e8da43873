//! TOML configuration.
//!
//! Every section and field is optional; unset values take the defaults
//! below. [`load_config`] falls back to [`Config::default`] when the file
//! does not exist, so a fresh checkout runs without any setup.
//!
//! ```toml
//! [index]
//! path = "./rag_vector_db"
//! corpus = "./knowledge"
//! include_globs = ["*.txt"]
//! recursive = false
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 100
//!
//! [retrieval]
//! top_k = 2
//! query_prefix_chars = 300
//! cache = true
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "gemini"
//! model = "gemini-1.5-flash"
//!
//! [damage]
//! mask_ratio = 0.1
//! placeholder = "[MASK]"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ecoscribe_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use ecoscribe_core::damage::MASK_TOKEN;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config/ecoscribe.toml";

/// File name of the persisted index inside `index.path`.
pub const INDEX_FILE: &str = "index.sqlite";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub damage: DamageConfig,
}

impl Config {
    /// Path of the SQLite index file.
    pub fn index_file(&self) -> PathBuf {
        self.index.path.join(INDEX_FILE)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted index.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Directory of reference documents.
    #[serde(default = "default_corpus")]
    pub corpus: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Descend into subdirectories of `corpus`.
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            corpus: default_corpus(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            recursive: false,
            follow_symlinks: false,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./rag_vector_db")
}
fn default_corpus() -> PathBuf {
    PathBuf::from("./knowledge")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Only this many leading characters of the damaged text form the query.
    #[serde(default = "default_query_prefix_chars")]
    pub query_prefix_chars: usize,
    /// Keep the loaded index in memory between queries.
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            query_prefix_chars: default_query_prefix_chars(),
            cache: true,
        }
    }
}

fn default_top_k() -> usize {
    2
}
fn default_query_prefix_chars() -> usize {
    300
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (Ollama, or an OpenAI-compatible gateway).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            temperature: None,
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct DamageConfig {
    #[serde(default = "default_mask_ratio")]
    pub mask_ratio: f64,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            mask_ratio: default_mask_ratio(),
            placeholder: default_placeholder(),
        }
    }
}

fn default_mask_ratio() -> f64 {
    0.1
}
fn default_placeholder() -> String {
    MASK_TOKEN.to_string()
}

/// Read, parse, and validate a config file. A missing file yields the
/// defaults; a file that exists but cannot be read or parsed is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.query_prefix_chars < 1 {
        bail!("retrieval.query_prefix_chars must be >= 1");
    }

    // Validate damage
    if !(0.0..=1.0).contains(&config.damage.mask_ratio) {
        bail!("damage.mask_ratio must be in [0.0, 1.0]");
    }
    if config.damage.placeholder.is_empty()
        || config.damage.placeholder.chars().any(char::is_whitespace)
    {
        bail!("damage.placeholder must be a single token without whitespace");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" | "hash" => {
            if config.embedding.dims.unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hash.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(config.retrieval.query_prefix_chars, 300);
        assert!(config.retrieval.cache);
        assert_eq!(config.index.include_globs, vec!["*.txt"]);
        assert!(!config.index.recursive);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.generation.provider, "gemini");
        assert_eq!(config.damage.placeholder, "[MASK]");
        assert_eq!(config.index_file(), PathBuf::from("./rag_vector_db/index.sqlite"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = parse_config(
            r#"
            [index]
            corpus = "./docs"

            [embedding]
            provider = "hash"
            dims = 128
            "#,
        )
        .unwrap();
        assert_eq!(config.index.corpus, PathBuf::from("./docs"));
        assert_eq!(config.index.path, PathBuf::from("./rag_vector_db"));
        assert_eq!(config.embedding.dims, Some(128));
        assert_eq!(config.embedding.batch_size, 64);
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_rejects_bad_mask_ratio() {
        assert!(parse_config("[damage]\nmask_ratio = 1.5\n").is_err());
        assert!(parse_config("[damage]\nplaceholder = \"two words\"\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse_config("[embedding]\nprovider = \"faiss\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"palm\"\n").is_err());
    }

    #[test]
    fn test_requires_dims_for_remote_and_hash() {
        assert!(parse_config("[embedding]\nprovider = \"hash\"\n").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n"
        )
        .is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"\ndims = 1536\n").is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[index\npath = ").unwrap();
        assert!(load_config(&path).is_err());
    }
}
