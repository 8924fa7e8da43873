//! Generative model clients.
//!
//! Each client implements [`Generator`] with a single HTTP request per
//! call. There is no retry: a failed call surfaces to the user as a
//! generation failure and they decide whether to try again. The request
//! timeout comes from `[generation] timeout_secs`.
//!
//! | Config Value | Client | Credentials |
//! |-------------|--------|-------------|
//! | `"gemini"` | [`GeminiGenerator`] | `GEMINI_API_KEY` |
//! | `"openai"` | [`OpenAIGenerator`] | `OPENAI_API_KEY` |
//! | `"ollama"` | [`OllamaGenerator`] | none |
//! | `"disabled"` | [`DisabledGenerator`] | none |

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use ecoscribe_core::restore::Generator;

use crate::config::GenerationConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled; set [generation] provider in the config")
    }
}

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn send_json(
    label: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("{} request failed: {}", label, e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body_text);
    }

    Ok(response.json().await?)
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub const DEFAULT_MODEL: &'static str = "gemini-1.5-flash";

    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if let Some(t) = self.temperature {
            body["generationConfig"] = serde_json::json!({ "temperature": t });
        }

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let json = send_json(
            "Gemini",
            self.client
                .post(url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
        )
        .await?;

        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| match json.pointer("/promptFeedback/blockReason") {
            Some(reason) => anyhow::anyhow!("Gemini blocked the prompt: {}", reason),
            None => anyhow::anyhow!("Invalid Gemini response: no candidates"),
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: candidate has no content"))?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect())
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }

        let json = send_json(
            "OpenAI",
            self.client
                .post(format!(
                    "{}/chat/completions",
                    self.base_url.trim_end_matches('/')
                ))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body),
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    base_url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;

        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = serde_json::json!({ "temperature": t });
        }

        let json = send_json(
            "Ollama",
            self.client
                .post(format!("{}/api/generate", self.base_url.trim_end_matches('/')))
                .json(&body),
        )
        .await
        .map_err(|e| anyhow::anyhow!("{} (is Ollama running at {}?)", e, self.base_url))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
