use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema if it does not exist. Idempotent; safe to run on every
/// startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id TEXT NOT NULL UNIQUE,
            thread_id TEXT NOT NULL DEFAULT '',
            from_address TEXT NOT NULL DEFAULT '',
            to_addresses TEXT NOT NULL DEFAULT '',
            cc_addresses TEXT,
            bcc_addresses TEXT,
            subject TEXT NOT NULL DEFAULT '',
            raw_html TEXT NOT NULL DEFAULT '',
            plain_text TEXT NOT NULL DEFAULT '',
            summary TEXT,
            date INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_emails_date ON emails(date DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_emails_thread ON emails(thread_id)")
        .execute(pool)
        .await?;

    Ok(())
}
