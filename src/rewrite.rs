//! Rewrite provider abstraction and implementations.
//!
//! Defines the [`RewriteProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when rewriting is not configured.
//! - **[`OpenAiProvider`]** — calls an OpenAI-compatible chat completions API.
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/chat` endpoint.
//! - **[`PassthroughProvider`]** — returns the input unchanged; lets the
//!   pipeline run end-to-end without a model (previews, tests).
//!
//! A provider turns one batch of raw caption text into punctuated,
//! segmented prose. The coverage gate lives upstream in [`crate::press`];
//! providers only own transport concerns.
//!
//! # Retry Strategy
//!
//! Remote providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::RewriteConfig;

/// A text-generation service that rewrites a block of caption text into
/// prose. May be slow; may return different output for identical input,
/// which is why callers retry under a coverage gate.
#[async_trait]
pub trait RewriteProvider: Send + Sync {
    /// Provider label for logs and summaries (e.g. `"openai:gpt-4o-mini"`).
    fn name(&self) -> String;

    /// Rewrite one batch of concatenated caption text.
    ///
    /// Errors are transport-level failures (after the provider's own
    /// retries); they are not coverage shortfalls.
    async fn rewrite(&self, text: &str) -> Result<String>;
}

/// Instantiate the provider named in the configuration.
///
/// Constructed once by the orchestrator and passed down; nothing in the
/// pipeline reaches for a global handle.
pub fn create_provider(config: &RewriteConfig) -> Result<Box<dyn RewriteProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        "passthrough" => Ok(Box::new(PassthroughProvider)),
        "disabled" => Ok(Box::new(DisabledProvider)),
        other => bail!("Unknown rewrite provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// Always errors. Default until `[rewrite]` is configured.
pub struct DisabledProvider;

#[async_trait]
impl RewriteProvider for DisabledProvider {
    fn name(&self) -> String {
        "disabled".to_string()
    }

    async fn rewrite(&self, _text: &str) -> Result<String> {
        bail!("Rewrite provider is disabled. Set [rewrite] provider in config.")
    }
}

// ============ Passthrough Provider ============

/// Returns the input unchanged. Coverage is trivially 1.0, so the whole
/// pipeline (chunking, artifacts, resume) can be exercised offline.
pub struct PassthroughProvider;

#[async_trait]
impl RewriteProvider for PassthroughProvider {
    fn name(&self) -> String {
        "passthrough".to_string()
    }

    async fn rewrite(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

// ============ OpenAI Provider ============

/// Rewrite provider using an OpenAI-compatible chat completions API.
///
/// Sends the configured system prompt plus the batch text to
/// `POST {url}/chat/completions`. The API key is read from the
/// environment variable named by `rewrite.api_key_env`
/// (default `OPENAI_API_KEY`).
pub struct OpenAiProvider {
    model: String,
    url: String,
    api_key: String,
    system_prompt: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &RewriteConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("rewrite.model required for OpenAI provider"))?;

        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url,
            api_key,
            system_prompt: config.system_prompt.clone(),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl RewriteProvider for OpenAiProvider {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn rewrite(&self, text: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": text},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Rewrite failed after retries")))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

// ============ Ollama Provider ============

/// Rewrite provider using a local Ollama instance.
///
/// Calls `POST /api/chat` with `stream: false` on the configured URL
/// (default `http://localhost:11434`). Requires Ollama to be running with
/// the model pulled.
pub struct OllamaProvider {
    model: String,
    url: String,
    system_prompt: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &RewriteConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("rewrite.model required for Ollama provider"))?;

        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url,
            system_prompt: config.system_prompt.clone(),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl RewriteProvider for OllamaProvider {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn rewrite(&self, text: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": text},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/chat", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_ollama_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Rewrite failed after retries")))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
}
