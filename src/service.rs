//! The restoration service: one handle for every front-end operation.
//!
//! [`RestorationService`] owns the injected embedding provider and
//! generative client and wires the retriever, restorer, builder, and
//! damage simulator together. It holds no per-request mutable state, so
//! it can be shared behind an `Arc` and used from concurrent tasks.
//!
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use ecoscribe::config::Config;
//! use ecoscribe::service::RestorationService;
//! use ecoscribe_core::models::Style;
//!
//! let service = RestorationService::from_config(Config::default())?;
//! let restored = service
//!     .restore_with_context("The [MASK] settlers spoke early Old English [MASK].", Style::Academic)
//!     .await?;
//! println!("{}", restored.text);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use ecoscribe_core::damage::{DamageSimulator, DamagedText};
use ecoscribe_core::embedding::Embedder;
use ecoscribe_core::error::Result;
use ecoscribe_core::index::IndexMeta;
use ecoscribe_core::models::{
    ContextOutcome, Restoration, RestorationMode, RestorationRequest, Style,
};
use ecoscribe_core::restore::{Generator, Restorer};

use crate::build::{build_index, BuildReport};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::retrieve::Retriever;

pub struct RestorationService {
    config: Config,
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    restorer: Restorer,
    damage: DamageSimulator,
}

impl RestorationService {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let damage = DamageSimulator::new(&config.damage.placeholder)?;
        let retriever = Retriever::new(&config, Arc::clone(&embedder));
        Ok(Self {
            config,
            embedder,
            retriever,
            restorer: Restorer::new(generator),
            damage,
        })
    }

    /// Create both providers from `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::new(config, embedder, generator)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn restorer(&self) -> &Restorer {
        &self.restorer
    }

    /// Mask `mask_ratio` of the words in `text`. A seed makes the result
    /// reproducible.
    pub fn simulate_damage(
        &self,
        text: &str,
        mask_ratio: f64,
        seed: Option<u64>,
    ) -> Result<DamagedText> {
        match seed {
            Some(seed) => self
                .damage
                .simulate(text, mask_ratio, &mut StdRng::seed_from_u64(seed)),
            None => self
                .damage
                .simulate(text, mask_ratio, &mut rand::thread_rng()),
        }
    }

    /// Restore without consulting the index.
    pub async fn restore_plain(&self, damaged_text: &str, style: Style) -> Result<Restoration> {
        let text = self.restorer.restore(damaged_text, style, None).await?;
        Ok(Restoration {
            text,
            style,
            mode: RestorationMode::Plain,
            context: ContextOutcome::NotRequested,
        })
    }

    /// Retrieve context for `damaged_text`, then restore with it. When no
    /// context can be retrieved the plain template is used and the reason
    /// is recorded in [`Restoration::context`].
    pub async fn restore_with_context(
        &self,
        damaged_text: &str,
        style: Style,
    ) -> Result<Restoration> {
        let outcome = self.retrieve_context(damaged_text).await;
        let context = outcome.context();
        let text = self
            .restorer
            .restore(damaged_text, style, context.as_deref())
            .await?;
        Ok(Restoration {
            text,
            style,
            mode: RestorationMode::Rag,
            context: outcome,
        })
    }

    pub async fn restore(&self, request: &RestorationRequest) -> Result<Restoration> {
        match request.mode {
            RestorationMode::Plain => self.restore_plain(&request.damaged_text, request.style).await,
            RestorationMode::Rag => {
                self.restore_with_context(&request.damaged_text, request.style)
                    .await
            }
        }
    }

    /// The prompt [`restore`](Self::restore) would send, and the retrieval
    /// outcome behind it. Retrieval still runs in RAG mode; generation
    /// does not.
    pub async fn preview(&self, request: &RestorationRequest) -> (String, ContextOutcome) {
        let outcome = match request.mode {
            RestorationMode::Plain => ContextOutcome::NotRequested,
            RestorationMode::Rag => self.retrieve_context(&request.damaged_text).await,
        };
        let context = outcome.context();
        let prompt = self
            .restorer
            .prompt_for(&request.damaged_text, request.style, context.as_deref());
        (prompt, outcome)
    }

    pub async fn explain_token(&self, full_text: &str, token: &str) -> Result<String> {
        self.restorer.explain(full_text, token).await
    }

    pub async fn refine(&self, restored_text: &str, feedback: &str) -> Result<String> {
        self.restorer.refine(restored_text, feedback).await
    }

    /// Top-k context for `query` using the configured `top_k`.
    pub async fn retrieve_context(&self, query: &str) -> ContextOutcome {
        self.retriever
            .retrieve_or_fallback(query, self.config.retrieval.top_k)
            .await
    }

    /// Rebuild the index from the configured corpus.
    pub async fn build_index(&self) -> Result<BuildReport> {
        build_index(&self.config, self.embedder.as_ref()).await
    }

    pub async fn index_stats(&self) -> Result<IndexMeta> {
        Ok(self.retriever.meta().await?)
    }
}
