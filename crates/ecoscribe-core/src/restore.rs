//! Restoration engine.
//!
//! The [`Restorer`] turns damaged text into a prompt and hands it to an
//! injected [`Generator`]. Restoration, token explanation, and feedback
//! refinement all go through the same primitive, [`Restorer::run`]: one
//! call, no retry, output trimmed.
//!
//! Choosing between plain and retrieval-augmented restoration is the
//! caller's job. Pass `Some(context)` to get the RAG template.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RestoreError, Result};
use crate::models::Style;
use crate::prompt;

/// A generative text backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier, for logs and reports.
    fn model_name(&self) -> &str;

    /// Complete `prompt`. One request per call.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct Restorer {
    generator: Arc<dyn Generator>,
}

impl Restorer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// The prompt [`restore`](Self::restore) would send, without sending it.
    pub fn prompt_for(&self, damaged_text: &str, style: Style, context: Option<&str>) -> String {
        prompt::restoration_prompt(damaged_text, style, context)
    }

    /// Reconstruct `damaged_text` in `style`, optionally grounded in `context`.
    pub async fn restore(
        &self,
        damaged_text: &str,
        style: Style,
        context: Option<&str>,
    ) -> Result<String> {
        tracing::debug!(
            style = %style,
            with_context = context.is_some(),
            chars = damaged_text.chars().count(),
            "restoring text"
        );
        self.run(&self.prompt_for(damaged_text, style, context))
            .await
    }

    /// The prompt [`explain`](Self::explain) would send.
    pub fn explain_prompt(&self, full_text: &str, token: &str) -> Result<String> {
        if token.trim().is_empty() {
            return Err(RestoreError::InvalidArgument(
                "token to explain must not be empty".to_string(),
            ));
        }
        Ok(prompt::explanation_prompt(full_text, token.trim()))
    }

    /// Ask the model why `token` appears in `full_text`.
    pub async fn explain(&self, full_text: &str, token: &str) -> Result<String> {
        let prompt = self.explain_prompt(full_text, token)?;
        self.run(&prompt).await
    }

    /// The prompt [`refine`](Self::refine) would send.
    pub fn refine_prompt(&self, restored_text: &str, feedback: &str) -> Result<String> {
        if restored_text.trim().is_empty() {
            return Err(RestoreError::InvalidArgument(
                "nothing to refine: restored text is empty".to_string(),
            ));
        }
        if feedback.trim().is_empty() {
            return Err(RestoreError::InvalidArgument(
                "feedback must not be empty".to_string(),
            ));
        }
        Ok(prompt::feedback_prompt(restored_text, feedback.trim()))
    }

    /// Revise a restoration according to reader feedback.
    pub async fn refine(&self, restored_text: &str, feedback: &str) -> Result<String> {
        let prompt = self.refine_prompt(restored_text, feedback)?;
        self.run(&prompt).await
    }

    /// Send `prompt` to the generator once and trim the answer.
    pub async fn run(&self, prompt: &str) -> Result<String> {
        let output = self.generator.generate(prompt).await.map_err(|e| {
            tracing::warn!(model = self.generator.model_name(), error = %e, "generation failed");
            RestoreError::GenerationFailure(format!("{:#}", e))
        })?;

        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Err(RestoreError::GenerationFailure(
                "empty response".to_string(),
            ));
        }
        Ok(trimmed.to_string())
    }
}
