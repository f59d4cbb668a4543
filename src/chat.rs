//! Conversational interface over the email corpus.
//!
//! Each turn grounds the model in the archive: the latest user message is
//! used as a semantic query, the top matches become a context block, and the
//! augmented history goes to the generative client.

use anyhow::Result;
use std::sync::Arc;

use crate::llm::{ChatMessage, GenerativeClient};
use crate::models::EmailRecord;
use crate::retrieval::SearchService;

const SYSTEM_PROMPT: &str = "You are mailmind, an assistant that answers based on the \
     user's email archive. Use the provided snippets to ground your answers; say so \
     when the archive does not contain the answer.";

/// Chat over the email corpus.
pub struct ChatService {
    search: Arc<SearchService>,
    generator: Arc<dyn GenerativeClient>,
}

impl ChatService {
    pub fn new(search: Arc<SearchService>, generator: Arc<dyn GenerativeClient>) -> Self {
        Self { search, generator }
    }

    /// Answer the latest user turn, grounded in the `top_k` most relevant
    /// emails. The full history is forwarded so the model keeps the thread.
    pub async fn chat_with_emails(
        &self,
        history: &[ChatMessage],
        top_k: usize,
    ) -> Result<String> {
        let user_message = history
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let relevant = if user_message.is_empty() {
            Vec::new()
        } else {
            self.search.search_semantic(user_message, top_k).await?
        };

        let mut augmented: Vec<ChatMessage> = history.to_vec();
        if !relevant.is_empty() {
            augmented.push(ChatMessage::new(
                "system",
                format!("Context from the email archive:\n{}", format_context(&relevant)),
            ));
        }

        self.generator.chat(SYSTEM_PROMPT, &augmented).await
    }
}

/// Render records into the snippet block shown to the model.
fn format_context(emails: &[EmailRecord]) -> String {
    emails
        .iter()
        .map(|email| {
            format!(
                "Subject: {}\nFrom: {}\nSummary: {}",
                email.subject,
                email.from_address,
                email.summary.as_deref().unwrap_or_else(|| email.preview(280)),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
