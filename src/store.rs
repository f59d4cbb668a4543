//! Durable email storage.
//!
//! [`EmailStore`] is the capability surface the rest of the system depends
//! on; [`SqliteEmailStore`] is the production implementation. Tests
//! substitute deterministic in-memory doubles through the trait.
//!
//! The store owns record ids: `save_emails` assigns them on first insert
//! (keyed on the provider `message_id`) and they are immutable afterwards.
//! Index structures hold ids only, never copies of records.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{EmailRecord, NewEmail};

#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Upsert a batch of emails keyed on `message_id`. Returns the assigned
    /// (or pre-existing) ids in input order.
    async fn save_emails(&self, emails: &[NewEmail]) -> Result<Vec<i64>>;

    /// Fetch one record by primary key.
    async fn get_email(&self, id: i64) -> Result<Option<EmailRecord>>;

    /// Fetch one record by the provider's message id.
    async fn get_by_message_id(&self, message_id: &str) -> Result<Option<EmailRecord>>;

    /// Case-insensitive substring search over subject and body, most recent
    /// first.
    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<EmailRecord>>;

    /// Most recent emails by delivery date.
    async fn list_recent(&self, limit: usize) -> Result<Vec<EmailRecord>>;
}

/// SQLite-backed store. Cheap to clone; the pool is shared.
#[derive(Clone)]
pub struct SqliteEmailStore {
    pool: SqlitePool,
}

impl SqliteEmailStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const RECORD_COLUMNS: &str = "id, message_id, thread_id, from_address, to_addresses, \
     cc_addresses, bcc_addresses, subject, raw_html, plain_text, summary, \
     date, created_at, updated_at";

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> EmailRecord {
    EmailRecord {
        id: row.get("id"),
        message_id: row.get("message_id"),
        thread_id: row.get("thread_id"),
        from_address: row.get("from_address"),
        to_addresses: row.get("to_addresses"),
        cc_addresses: row.get("cc_addresses"),
        bcc_addresses: row.get("bcc_addresses"),
        subject: row.get("subject"),
        raw_html: row.get("raw_html"),
        plain_text: row.get("plain_text"),
        summary: row.get("summary"),
        date: row.get("date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl EmailStore for SqliteEmailStore {
    async fn save_emails(&self, emails: &[NewEmail]) -> Result<Vec<i64>> {
        let now = chrono::Utc::now().timestamp();
        let mut ids = Vec::with_capacity(emails.len());

        let mut tx = self.pool.begin().await?;
        for email in emails {
            sqlx::query(
                r#"
                INSERT INTO emails (message_id, thread_id, from_address, to_addresses,
                                    cc_addresses, bcc_addresses, subject, raw_html,
                                    plain_text, summary, date, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(message_id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    from_address = excluded.from_address,
                    to_addresses = excluded.to_addresses,
                    cc_addresses = excluded.cc_addresses,
                    bcc_addresses = excluded.bcc_addresses,
                    subject = excluded.subject,
                    raw_html = excluded.raw_html,
                    plain_text = excluded.plain_text,
                    summary = excluded.summary,
                    date = excluded.date,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&email.message_id)
            .bind(&email.thread_id)
            .bind(&email.from_address)
            .bind(&email.to_addresses)
            .bind(&email.cc_addresses)
            .bind(&email.bcc_addresses)
            .bind(&email.subject)
            .bind(&email.raw_html)
            .bind(&email.plain_text)
            .bind(&email.summary)
            .bind(email.date)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let id: i64 = sqlx::query_scalar("SELECT id FROM emails WHERE message_id = ?")
                .bind(&email.message_id)
                .fetch_one(&mut *tx)
                .await?;
            ids.push(id);
        }
        tx.commit().await?;

        tracing::info!(count = emails.len(), "saved emails");
        Ok(ids)
    }

    async fn get_email(&self, id: i64) -> Result<Option<EmailRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM emails WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn get_by_message_id(&self, message_id: &str) -> Result<Option<EmailRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM emails WHERE message_id = ?"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<EmailRecord>> {
        let pattern = format!("%{}%", query);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM emails
            WHERE subject LIKE ?1 OR plain_text LIKE ?1
            ORDER BY date DESC
            LIMIT ?2
            "#
        ))
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<EmailRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM emails ORDER BY date DESC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}
