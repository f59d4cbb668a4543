//! Email summarization.
//!
//! Summaries are an enrichment: ingestion stores them when a summarizer is
//! configured and carries on without them when it is not (or when a call
//! fails). The OpenAI implementation rides the same chat-completions
//! endpoint and retry policy as the generative client.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::llm::{chat_completion, ChatMessage};

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Generate a short summary of the text. Empty input yields an empty
    /// summary without a model call.
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Always-failing summarizer for `summarizer.provider = "disabled"`.
/// Ingestion checks the config before constructing one, so this surfaces
/// only on direct misuse.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String> {
        bail!("summarizer is disabled")
    }
}

/// Chat-completions-backed summarizer.
pub struct OpenAiSummarizer {
    model: String,
    max_words: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarizer.model required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            max_words: config.max_words,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let messages = vec![
            ChatMessage::new(
                "system",
                format!(
                    "Summarize the following email in at most {} words. \
                     Keep names, dates, and action items.",
                    self.max_words
                ),
            ),
            ChatMessage::new("user", text),
        ];

        // Word budget to token budget, with headroom for formatting.
        let max_tokens = (self.max_words * 2).max(64) as u32;
        chat_completion(
            &self.client,
            &self.model,
            &messages,
            max_tokens,
            0.0,
            self.max_retries,
        )
        .await
    }
}

/// Create the appropriate [`Summarizer`] based on configuration.
pub fn create_summarizer(config: &SummarizerConfig) -> Result<Arc<dyn Summarizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSummarizer)),
        "openai" => Ok(Arc::new(OpenAiSummarizer::new(config)?)),
        other => bail!("unknown summarizer provider: {}", other),
    }
}
