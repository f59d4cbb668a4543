//! Ingestion pipeline orchestration.
//!
//! Coordinates the full sync flow: mail provider → HTML cleaning →
//! summarization → store → index. Summarization is an inline enrichment and
//! non-fatal per message; indexing runs over the records as the store
//! persisted them, so the indexes only ever see store-assigned ids.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::clean::html_to_text;
use crate::indexer::IndexCoordinator;
use crate::mail::MailClient;
use crate::models::NewEmail;
use crate::store::EmailStore;
use crate::summarize::Summarizer;

/// Counters reported by one sync run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub fetched: usize,
    pub stored: usize,
    pub summarized: usize,
    pub indexed: usize,
}

/// Download, clean, store, summarize, and index emails.
pub struct IngestionService {
    mail: Arc<dyn MailClient>,
    store: Arc<dyn EmailStore>,
    summarizer: Option<Arc<dyn Summarizer>>,
    coordinator: IndexCoordinator,
}

impl IngestionService {
    pub fn new(
        mail: Arc<dyn MailClient>,
        store: Arc<dyn EmailStore>,
        summarizer: Option<Arc<dyn Summarizer>>,
        coordinator: IndexCoordinator,
    ) -> Self {
        Self {
            mail,
            store,
            summarizer,
            coordinator,
        }
    }

    /// Run one sync pass. Returns counters for CLI/API reporting.
    pub async fn sync(&self, max_results: usize) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        let raw_messages = self
            .mail
            .fetch_messages(max_results)
            .await
            .context("failed to fetch messages from mail provider")?;
        report.fetched = raw_messages.len();

        if raw_messages.is_empty() {
            return Ok(report);
        }

        let mut new_emails = Vec::with_capacity(raw_messages.len());
        for raw in raw_messages {
            let plain_text = html_to_text(&raw.raw_html);

            let summary = match &self.summarizer {
                Some(summarizer) => match summarizer.summarize(&plain_text).await {
                    Ok(s) if !s.is_empty() => {
                        report.summarized += 1;
                        Some(s)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(message_id = %raw.message_id, "summarization failed: {e}");
                        None
                    }
                },
                None => None,
            };

            new_emails.push(NewEmail {
                message_id: raw.message_id,
                thread_id: raw.thread_id,
                from_address: raw.from_address,
                to_addresses: raw.to_addresses,
                cc_addresses: raw.cc_addresses,
                bcc_addresses: raw.bcc_addresses,
                subject: raw.subject,
                raw_html: raw.raw_html,
                plain_text,
                summary,
                date: raw.date,
            });
        }

        let ids = self
            .store
            .save_emails(&new_emails)
            .await
            .context("failed to save emails")?;
        report.stored = ids.len();

        // Index the records as persisted: ids and any store-side
        // normalization come back from the store, not from our batch.
        let mut persisted = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.store.get_email(id).await? {
                persisted.push(record);
            }
        }

        report.indexed = self.coordinator.index_emails(&persisted).await?;

        tracing::info!(
            fetched = report.fetched,
            stored = report.stored,
            indexed = report.indexed,
            "sync complete"
        );
        Ok(report)
    }
}
