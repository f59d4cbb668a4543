//! Generative model client for chat and drafting.
//!
//! [`GenerativeClient`] is the capability surface; [`OpenAiGenerator`] binds
//! it to an OpenAI-compatible chat-completions API. The retry policy matches
//! the embedding client: backoff on 429/5xx/network errors, immediate
//! failure on other client errors.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::models::EmailRecord;

/// One turn of a conversation, OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Conversational and drafting abilities over the email corpus.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Chat given a system prompt and message history.
    async fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String>;

    /// Generate an email draft from an instruction and optional context
    /// emails.
    async fn draft(&self, instruction: &str, context: &[EmailRecord]) -> Result<String>;
}

/// Always-failing client used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl GenerativeClient for DisabledGenerator {
    async fn chat(&self, _system_prompt: &str, _messages: &[ChatMessage]) -> Result<String> {
        bail!("generation provider is disabled")
    }

    async fn draft(&self, _instruction: &str, _context: &[EmailRecord]) -> Result<String> {
        bail!("generation provider is disabled")
    }
}

/// Chat-completions-backed client. Requires `OPENAI_API_KEY`.
pub struct OpenAiGenerator {
    model: String,
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl GenerativeClient for OpenAiGenerator {
    async fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(ChatMessage::new("system", system_prompt));
        wire.extend_from_slice(messages);

        chat_completion(
            &self.client,
            &self.model,
            &wire,
            self.max_tokens,
            self.temperature,
            self.max_retries,
        )
        .await
    }

    async fn draft(&self, instruction: &str, context: &[EmailRecord]) -> Result<String> {
        let prompt = build_draft_prompt(instruction, context);
        let wire = vec![
            ChatMessage::new(
                "system",
                "You are an email drafting assistant. Write a complete, ready-to-send draft.",
            ),
            ChatMessage::new("user", prompt),
        ];

        chat_completion(
            &self.client,
            &self.model,
            &wire,
            self.max_tokens,
            self.temperature,
            self.max_retries,
        )
        .await
    }
}

/// Render context emails plus the instruction into one drafting request.
fn build_draft_prompt(instruction: &str, context: &[EmailRecord]) -> String {
    let mut prompt = String::new();
    if !context.is_empty() {
        prompt.push_str("Relevant emails from the archive:\n\n");
        for email in context {
            prompt.push_str(&format!(
                "From: {}\nSubject: {}\n{}\n\n",
                email.from_address,
                email.subject,
                email.summary.as_deref().unwrap_or_else(|| email.preview(280)),
            ));
        }
    }
    prompt.push_str(&format!("Instruction: {}\n\nDraft:", instruction));
    prompt
}

/// Call an OpenAI-compatible chat-completions endpoint with retry/backoff
/// and return the first choice's message content.
pub(crate) async fn chat_completion(
    client: &reqwest::Client,
    model: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
) -> Result<String> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let body = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
        "temperature": temperature,
    });

    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_completion_response(&json);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    tracing::warn!(status = %status, "chat completions error, retrying");
                    last_err =
                        Some(anyhow::anyhow!("chat API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("chat API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed after retries")))
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("invalid chat response: missing choices[0].message.content"))
}

/// Create the appropriate [`GenerativeClient`] based on configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerativeClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => bail!("unknown generation provider: {}", other),
    }
}
