//! Core data models used throughout mailmind.
//!
//! These types represent email messages as they flow through the ingestion
//! and retrieval pipeline: raw provider messages, unsaved records, and
//! persisted records with store-assigned ids.

/// Message as fetched from the mail provider, before cleaning.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub from_address: String,
    pub to_addresses: String,
    pub cc_addresses: Option<String>,
    pub bcc_addresses: Option<String>,
    /// Body as delivered: HTML for most mail, occasionally already plain text.
    pub raw_html: String,
    /// Delivery time, unix seconds.
    pub date: i64,
}

/// A cleaned email ready to be persisted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub message_id: String,
    pub thread_id: String,
    pub from_address: String,
    pub to_addresses: String,
    pub cc_addresses: Option<String>,
    pub bcc_addresses: Option<String>,
    pub subject: String,
    pub raw_html: String,
    pub plain_text: String,
    pub summary: Option<String>,
    pub date: i64,
}

/// Persisted email record. `id` is assigned by the store on first insert and
/// never changes; the index structures refer to records by this id only.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailRecord {
    pub id: i64,
    pub message_id: String,
    pub thread_id: String,
    pub from_address: String,
    pub to_addresses: String,
    pub cc_addresses: Option<String>,
    pub bcc_addresses: Option<String>,
    pub subject: String,
    pub raw_html: String,
    pub plain_text: String,
    pub summary: Option<String>,
    pub date: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmailRecord {
    /// Text the keyword index tokenizes: subject plus body.
    pub fn indexable_text(&self) -> String {
        format!("{} {}", self.subject, self.plain_text)
    }

    /// Body prefix used by CLI output and chat context when no summary has
    /// been generated. Cuts on a char boundary.
    pub fn preview(&self, max_chars: usize) -> &str {
        let end = self
            .plain_text
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(self.plain_text.len());
        &self.plain_text[..end]
    }
}
