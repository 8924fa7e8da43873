//! # EcoScribe CLI (`ecoscribe`)
//!
//! ## Usage
//!
//! ```bash
//! ecoscribe --config ./config/ecoscribe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ecoscribe index build` | Index the reference corpus |
//! | `ecoscribe index stats` | Show metadata of the current index |
//! | `ecoscribe damage <file>` | Mask a fraction of the words in a text |
//! | `ecoscribe retrieve "<query>"` | Show the context passages for a query |
//! | `ecoscribe restore <file>` | Restore damaged text (plain or RAG) |
//! | `ecoscribe explain <file> --token T` | Explain a word in a restored text |
//! | `ecoscribe refine <file> --feedback F` | Revise a restoration from feedback |
//!
//! `<file>` may be `-` to read from stdin. Logs go to stderr (`RUST_LOG`
//! controls the level); results go to stdout.
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from ./knowledge
//! ecoscribe index build
//!
//! # Damage a page and restore it with retrieved context
//! ecoscribe damage page.txt --ratio 0.2 --seed 7 > damaged.txt
//! ecoscribe restore damaged.txt --mode rag --style academic
//!
//! # Inspect the prompt without calling the model
//! ecoscribe restore damaged.txt --mode rag --print-prompt
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecoscribe::config::{self, Config, DEFAULT_CONFIG_PATH};
use ecoscribe::embedding::{create_embedder, DisabledEmbedder};
use ecoscribe::generation::{create_generator, DisabledGenerator};
use ecoscribe::service::RestorationService;
use ecoscribe_core::embedding::Embedder;
use ecoscribe_core::models::{
    ContextOutcome, DocumentRecord, RestorationMode, RestorationRequest, Style, CONTEXT_UNAVAILABLE,
};
use ecoscribe_core::restore::Generator;

/// EcoScribe: restore damaged historical-document text with
/// retrieval-augmented generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ecoscribe.example.toml` for a full example. A missing
/// file means built-in defaults.
#[derive(Parser)]
#[command(name = "ecoscribe", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or inspect the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Replace a fraction of the words in a text with a placeholder.
    Damage {
        /// Input text file, or `-` for stdin.
        input: PathBuf,

        /// Fraction of words to mask, in [0, 1]. Defaults to `[damage] mask_ratio`.
        #[arg(long)]
        ratio: Option<f64>,

        /// Seed for reproducible masking.
        #[arg(long)]
        seed: Option<u64>,

        /// Print the masked positions as JSON as well.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve context passages for a query.
    Retrieve {
        query: String,

        /// Number of passages, at least 1. Defaults to `[retrieval] top_k`.
        #[arg(long)]
        k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Restore damaged text.
    Restore {
        /// Input text file, or `-` for stdin.
        input: PathBuf,

        /// Writing style: simple, legal, or academic.
        #[arg(long, default_value = "simple")]
        style: Style,

        /// plain (no context) or rag (retrieve context first).
        #[arg(long, default_value = "plain")]
        mode: RestorationMode,

        /// Damage the input with this mask ratio before restoring it.
        #[arg(long)]
        damage: Option<f64>,

        /// Seed for `--damage`.
        #[arg(long, requires = "damage")]
        seed: Option<u64>,

        /// Print the prompt instead of calling the model.
        #[arg(long)]
        print_prompt: bool,

        /// Print the document record as JSON.
        #[arg(long, conflicts_with = "print_prompt")]
        json: bool,
    },

    /// Explain why a word appears in a restored text.
    Explain {
        /// Restored text file, or `-` for stdin.
        input: PathBuf,

        #[arg(long)]
        token: String,

        #[arg(long)]
        print_prompt: bool,
    },

    /// Revise a restored text according to feedback.
    Refine {
        /// Restored text file, or `-` for stdin.
        input: PathBuf,

        #[arg(long)]
        feedback: String,

        #[arg(long)]
        print_prompt: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Rebuild the index from `[index] corpus`, replacing any existing one.
    Build,
    /// Show metadata and sources of the current index.
    Stats,
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Providers that cannot be created degrade retrieval instead of aborting.
fn lenient_embedder(cfg: &Config) -> Arc<dyn Embedder> {
    create_embedder(&cfg.embedding).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "embedding provider unavailable; retrieval will be skipped");
        Arc::new(DisabledEmbedder)
    })
}

fn generator_for(cfg: &Config, print_prompt: bool) -> Result<Arc<dyn Generator>> {
    if print_prompt {
        return Ok(Arc::new(DisabledGenerator));
    }
    create_generator(&cfg.generation).context("Failed to create generation provider")
}

fn report_context(outcome: &ContextOutcome) {
    if let ContextOutcome::Unavailable { reason } = outcome {
        eprintln!("{}", CONTEXT_UNAVAILABLE);
        tracing::info!(%reason, "restored without context");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index {
            action: IndexAction::Build,
        } => {
            let embedder =
                create_embedder(&cfg.embedding).context("Failed to create embedding provider")?;
            let service = RestorationService::new(cfg, embedder, Arc::new(DisabledGenerator))?;
            let report = service.build_index().await?;

            println!("index build");
            println!("  documents: {}", report.documents);
            println!("  chunks: {}", report.chunks);
            for skipped in &report.skipped {
                println!("  skipped: {} ({})", skipped.source_id, skipped.reason);
            }
            println!("  model: {} ({} dims)", report.model, report.dims);
            println!("  build id: {}", report.build_id);
            println!("  path: {}", report.path.display());
            println!("  elapsed: {:.2}s", report.elapsed.as_secs_f64());
            println!("ok");
        }
        Commands::Index {
            action: IndexAction::Stats,
        } => {
            let index_file = cfg.index_file();
            let service =
                RestorationService::new(cfg, Arc::new(DisabledEmbedder), Arc::new(DisabledGenerator))?;
            let meta = service.index_stats().await?;
            let sources = ecoscribe::store::read_sources(&index_file).await?;

            println!("index {}", index_file.display());
            println!("  build id: {}", meta.build_id);
            println!("  built at: {}", meta.built_at.format("%Y-%m-%dT%H:%M:%SZ"));
            println!("  model: {} ({} dims)", meta.model, meta.dims);
            println!(
                "  chunking: size {} overlap {}",
                meta.chunk_size, meta.chunk_overlap
            );
            println!("  sources: {}", meta.source_count);
            for source in &sources {
                println!(
                    "    {} ({} chars, {} chunks)",
                    source.source_id, source.char_count, source.chunk_count
                );
            }
            println!("  chunks: {}", meta.chunk_count);
        }
        Commands::Damage {
            input,
            ratio,
            seed,
            json,
        } => {
            let text = read_input(&input)?;
            let ratio = ratio.unwrap_or(cfg.damage.mask_ratio);
            let service =
                RestorationService::new(cfg, Arc::new(DisabledEmbedder), Arc::new(DisabledGenerator))?;
            let damaged = service.simulate_damage(&text, ratio, seed)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&damaged)?);
            } else {
                println!("{}", damaged.text);
            }
        }
        Commands::Retrieve { query, k, json } => {
            let k = k.unwrap_or(cfg.retrieval.top_k);
            if k == 0 {
                anyhow::bail!("--k must be at least 1");
            }
            let embedder = lenient_embedder(&cfg);
            let service = RestorationService::new(cfg, embedder, Arc::new(DisabledGenerator))?;
            let outcome = service.retriever().retrieve_or_fallback(&query, k).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                match &outcome {
                    ContextOutcome::Found(ctx) => {
                        for (i, passage) in ctx.passages.iter().enumerate() {
                            println!(
                                "{}. [{:.4}] {}#{}",
                                i + 1,
                                passage.score,
                                passage.chunk.source_id,
                                passage.chunk.chunk_index
                            );
                            println!("{}", passage.chunk.text);
                            println!();
                        }
                    }
                    other => println!("{}", other.as_prompt_text()),
                }
            }
        }
        Commands::Restore {
            input,
            style,
            mode,
            damage,
            seed,
            print_prompt,
            json,
        } => {
            let text = read_input(&input)?;
            let embedder: Arc<dyn Embedder> = match mode {
                RestorationMode::Rag => lenient_embedder(&cfg),
                RestorationMode::Plain => Arc::new(DisabledEmbedder),
            };
            let generator = generator_for(&cfg, print_prompt)?;
            let service = RestorationService::new(cfg, embedder, generator)?;

            let damaged_text = match damage {
                Some(ratio) => {
                    let damaged = service.simulate_damage(&text, ratio, seed)?;
                    tracing::info!(masked = damaged.masked.len(), "damaged input");
                    damaged.text
                }
                None => text.trim().to_string(),
            };

            let request = RestorationRequest {
                damaged_text,
                style,
                mode,
            };

            if print_prompt {
                let (prompt, outcome) = service.preview(&request).await;
                report_context(&outcome);
                println!("{}", prompt);
                return Ok(());
            }

            let restoration = service.restore(&request).await?;
            report_context(&restoration.context);

            if json {
                let mut record = DocumentRecord::new(input.to_string_lossy());
                record.apply(&request.damaged_text, &restoration);
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", restoration.text);
            }
        }
        Commands::Explain {
            input,
            token,
            print_prompt,
        } => {
            let text = read_input(&input)?;
            let generator = generator_for(&cfg, print_prompt)?;
            let service = RestorationService::new(cfg, Arc::new(DisabledEmbedder), generator)?;

            if print_prompt {
                println!("{}", service.restorer().explain_prompt(text.trim(), &token)?);
            } else {
                println!("{}", service.explain_token(text.trim(), &token).await?);
            }
        }
        Commands::Refine {
            input,
            feedback,
            print_prompt,
        } => {
            let text = read_input(&input)?;
            let generator = generator_for(&cfg, print_prompt)?;
            let service = RestorationService::new(cfg, Arc::new(DisabledEmbedder), generator)?;

            if print_prompt {
                println!("{}", service.restorer().refine_prompt(text.trim(), &feedback)?);
            } else {
                println!("{}", service.refine(text.trim(), &feedback).await?);
            }
        }
    }

    Ok(())
}
