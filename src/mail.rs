//! Mail provider client.
//!
//! [`MailClient`] is the narrow surface ingestion needs: fetch the most
//! recent messages. [`GmailApiClient`] implements it against the Gmail REST
//! API with a pre-authorized bearer token (the interactive consent flow that
//! produces the token is outside this system). Response parsing is kept in
//! pure functions over JSON values so it is testable without the network.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MailConfig;
use crate::models::RawMessage;

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

#[async_trait]
pub trait MailClient: Send + Sync {
    /// Fetch up to `max_results` recent messages, newest first.
    async fn fetch_messages(&self, max_results: usize) -> Result<Vec<RawMessage>>;
}

/// Always-failing client for `mail.provider = "disabled"`.
pub struct DisabledMailClient;

#[async_trait]
impl MailClient for DisabledMailClient {
    async fn fetch_messages(&self, _max_results: usize) -> Result<Vec<RawMessage>> {
        bail!("mail provider is disabled")
    }
}

/// Gmail REST API client.
pub struct GmailApiClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl GmailApiClient {
    /// Build a client from configuration: the bearer token comes from the
    /// `GMAIL_ACCESS_TOKEN` environment variable or from the configured
    /// token file (raw token or JSON with an `access_token` field).
    pub fn new(config: &MailConfig) -> Result<Self> {
        let token = load_token(config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            token,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        })
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .with_context(|| format!("mail API request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("mail API error {}: {}", status, body);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MailClient for GmailApiClient {
    async fn fetch_messages(&self, max_results: usize) -> Result<Vec<RawMessage>> {
        tracing::info!(max_results, "fetching messages from mail provider");

        let list_url = format!(
            "{}/users/me/messages?maxResults={}",
            self.base_url, max_results
        );
        let listing = self.get_json(&list_url).await?;
        let ids = parse_message_ids(&listing);

        let mut fetched = Vec::with_capacity(ids.len());
        for id in ids {
            let url = format!("{}/users/me/messages/{}?format=full", self.base_url, id);
            let full = self.get_json(&url).await?;
            match parse_message(&full) {
                Ok(message) => fetched.push(message),
                Err(e) => tracing::warn!(message_id = %id, "skipping unparseable message: {e}"),
            }
        }

        tracing::info!(count = fetched.len(), "fetched messages");
        Ok(fetched)
    }
}

fn load_token(config: &MailConfig) -> Result<String> {
    if let Ok(token) = std::env::var("GMAIL_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    let path: &Path = config.token_path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mail token file: {}", path.display()))?;

    // Token files are either the bare token or JSON from the consent flow.
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) {
        if let Some(token) = json.get("access_token").and_then(|t| t.as_str()) {
            return Ok(token.to_string());
        }
    }

    let token = raw.trim();
    if token.is_empty() {
        bail!("mail token file is empty: {}", path.display());
    }
    Ok(token.to_string())
}

/// Ids from a `users/me/messages` listing.
fn parse_message_ids(json: &serde_json::Value) -> Vec<String> {
    json.get("messages")
        .and_then(|m| m.as_array())
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Convert one `format=full` message into a [`RawMessage`].
fn parse_message(json: &serde_json::Value) -> Result<RawMessage> {
    let message_id = json
        .get("id")
        .and_then(|id| id.as_str())
        .ok_or_else(|| anyhow::anyhow!("message missing id"))?
        .to_string();
    let thread_id = json
        .get("threadId")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    let payload = json.get("payload").cloned().unwrap_or_default();
    let header = |name: &str| -> Option<String> {
        payload
            .get("headers")
            .and_then(|h| h.as_array())
            .and_then(|headers| {
                headers.iter().find(|h| {
                    h.get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| n.eq_ignore_ascii_case(name))
                        .unwrap_or(false)
                })
            })
            .and_then(|h| h.get("value").and_then(|v| v.as_str()))
            .map(str::to_string)
    };

    let body = extract_body(&payload)
        .or_else(|| {
            json.get("snippet")
                .and_then(|s| s.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default();

    // internalDate is epoch milliseconds as a string.
    let date = json
        .get("internalDate")
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<i64>().ok())
        .map(|ms| ms / 1000)
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    Ok(RawMessage {
        message_id,
        thread_id,
        subject: header("Subject").unwrap_or_else(|| "(no subject)".to_string()),
        from_address: header("From").unwrap_or_default(),
        to_addresses: header("To").unwrap_or_default(),
        cc_addresses: header("Cc"),
        bcc_addresses: header("Bcc"),
        raw_html: body,
        date,
    })
}

/// Walk the MIME tree for the first `text/html` part, falling back to
/// `text/plain`, decoding the provider's url-safe base64.
fn extract_body(payload: &serde_json::Value) -> Option<String> {
    find_part(payload, "text/html").or_else(|| find_part(payload, "text/plain"))
}

fn find_part(part: &serde_json::Value, mime_type: &str) -> Option<String> {
    let part_mime = part.get("mimeType").and_then(|m| m.as_str()).unwrap_or("");
    if part_mime == mime_type {
        if let Some(data) = part
            .get("body")
            .and_then(|b| b.get("data"))
            .and_then(|d| d.as_str())
        {
            return decode_body(data);
        }
    }

    part.get("parts")
        .and_then(|p| p.as_array())
        .and_then(|parts| parts.iter().find_map(|p| find_part(p, mime_type)))
}

fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Create the appropriate [`MailClient`] based on configuration.
pub fn create_mail_client(config: &MailConfig) -> Result<Arc<dyn MailClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledMailClient)),
        "gmail" => Ok(Arc::new(GmailApiClient::new(config)?)),
        other => bail!("unknown mail provider: {}", other),
    }
}
