//! # mailmind CLI
//!
//! The `mailmind` binary is the primary interface for mailmind. It provides
//! commands for database initialization, mail ingestion, search, chat,
//! drafting, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! mailmind --config ./config/mailmind.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mailmind init` | Create the SQLite database and run schema migrations |
//! | `mailmind sync` | Fetch mail, clean, store, summarize, and index it |
//! | `mailmind search "<query>"` | Search the archive (keyword/semantic/hybrid) |
//! | `mailmind get <id>` | Print a full email by id |
//! | `mailmind recent` | List the most recent emails |
//! | `mailmind chat` | Chat over the archive (interactive or one-shot) |
//! | `mailmind draft "<instruction>"` | Generate an email draft |
//! | `mailmind serve` | Start the HTTP API server |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use parking_lot::RwLock;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use mailmind::chat::ChatService;
use mailmind::config::{self, Config};
use mailmind::db;
use mailmind::draft::DraftingService;
use mailmind::embedding::create_embedder;
use mailmind::indexer::IndexCoordinator;
use mailmind::ingest::IngestionService;
use mailmind::keyword_index::KeywordIndex;
use mailmind::llm::{create_generator, ChatMessage};
use mailmind::mail::create_mail_client;
use mailmind::migrate;
use mailmind::models::EmailRecord;
use mailmind::retrieval::SearchService;
use mailmind::server;
use mailmind::store::{EmailStore, SqliteEmailStore};
use mailmind::summarize::create_summarizer;
use mailmind::vector_index::VectorIndex;

/// mailmind — a local-first email assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mailmind.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mailmind",
    about = "mailmind — ingest, search, chat over, and draft from your email archive",
    version,
    long_about = "mailmind pulls mail from a provider, cleans and summarizes it, stores \
    records in SQLite, maintains vector and keyword indexes, and answers search, chat, \
    and drafting requests against the corpus via CLI and HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mailmind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the emails table. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Fetch mail from the configured provider and index it.
    ///
    /// Downloads recent messages, converts HTML bodies to plain text,
    /// optionally summarizes them, stores everything, and updates the
    /// vector and keyword indexes. Requires `[mail]` and `[embedding]`
    /// providers in config.
    Sync {
        /// Maximum number of messages to fetch.
        #[arg(long, default_value_t = 200)]
        max_results: usize,
    },

    /// Search the email archive.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `keyword` (store substring match), `semantic`
        /// (vector similarity), or `hybrid` (semantic first, then keyword).
        /// Semantic and hybrid modes require an embedding provider.
        #[arg(long, default_value = "semantic")]
        mode: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a full email by its id.
    Get {
        /// Record id as shown in search results.
        id: i64,
    },

    /// List the most recent emails.
    Recent {
        /// Maximum number of emails to list.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Chat over the email archive.
    ///
    /// With `--message`, answers once and exits. Without it, starts an
    /// interactive session (type `exit` to quit). Requires `[generation]`
    /// and `[embedding]` providers.
    Chat {
        /// Ask a single question instead of starting an interactive session.
        #[arg(long)]
        message: Option<String>,
    },

    /// Generate an email draft.
    ///
    /// Requires `[generation]` and `[embedding]` providers.
    Draft {
        /// What the draft should accomplish.
        instruction: String,

        /// Optional topic to search the archive for supporting context.
        #[arg(long)]
        about: Option<String>,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mailmind=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync { max_results } => {
            run_sync(&cfg, max_results).await?;
        }
        Commands::Search { query, mode, limit } => {
            run_search(&cfg, &query, &mode, limit).await?;
        }
        Commands::Get { id } => {
            run_get(&cfg, id).await?;
        }
        Commands::Recent { limit } => {
            run_recent(&cfg, limit).await?;
        }
        Commands::Chat { message } => {
            run_chat(&cfg, message).await?;
        }
        Commands::Draft { instruction, about } => {
            run_draft(&cfg, &instruction, about.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

// ============ Bootstrap helpers ============

async fn open_store(cfg: &Config) -> Result<Arc<SqliteEmailStore>> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteEmailStore::new(pool)))
}

/// Search service over explicit index instances. Requires embeddings.
fn build_search_service(
    cfg: &Config,
    store: Arc<dyn EmailStore>,
) -> Result<Arc<SearchService>> {
    if !cfg.embedding.is_enabled() {
        bail!("this command requires embeddings; set [embedding] provider in config");
    }
    let embedder = create_embedder(&cfg.embedding)?;
    let dims = cfg.embedding.dims.unwrap_or(0);
    let vector_index = Arc::new(RwLock::new(VectorIndex::open(
        dims,
        &cfg.vector_index.path,
    )?));
    Ok(Arc::new(SearchService::new(store, embedder, vector_index)))
}

// ============ Commands ============

async fn run_sync(cfg: &Config, max_results: usize) -> Result<()> {
    if !cfg.mail.is_enabled() {
        bail!("sync requires a mail provider; set [mail] provider in config");
    }
    if !cfg.embedding.is_enabled() {
        bail!("sync requires embeddings; set [embedding] provider in config");
    }

    let store = open_store(cfg).await?;
    let embedder = create_embedder(&cfg.embedding)?;
    let dims = cfg.embedding.dims.unwrap_or(0);
    let vector_index = Arc::new(RwLock::new(VectorIndex::open(
        dims,
        &cfg.vector_index.path,
    )?));
    let keyword_index = Arc::new(RwLock::new(KeywordIndex::new()));
    let coordinator = IndexCoordinator::new(embedder, vector_index, keyword_index);

    let summarizer = if cfg.summarizer.is_enabled() {
        Some(create_summarizer(&cfg.summarizer)?)
    } else {
        None
    };

    let ingestion = IngestionService::new(
        create_mail_client(&cfg.mail)?,
        store,
        summarizer,
        coordinator,
    );

    let report = ingestion.sync(max_results).await?;

    println!("sync {}", cfg.mail.provider);
    println!("  fetched: {} messages", report.fetched);
    println!("  stored: {}", report.stored);
    if cfg.summarizer.is_enabled() {
        println!("  summarized: {}", report.summarized);
    }
    println!("  indexed: {}", report.indexed);
    println!("ok");
    Ok(())
}

async fn run_search(
    cfg: &Config,
    query: &str,
    mode: &str,
    limit: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let limit = limit.unwrap_or(cfg.retrieval.final_limit);
    let store = open_store(cfg).await?;

    let results = match mode {
        "keyword" => store.search_text(query, limit).await?,
        "semantic" => {
            let search = build_search_service(cfg, store.clone())?;
            search.search_semantic(query, limit).await?
        }
        "hybrid" => {
            let search = build_search_service(cfg, store.clone())?;
            search.search_hybrid(query, limit).await?
        }
        _ => bail!(
            "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
            mode
        ),
    };

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, email) in results.iter().enumerate() {
        print_email_line(i + 1, email);
    }
    Ok(())
}

fn print_email_line(rank: usize, email: &EmailRecord) {
    let date = chrono::DateTime::from_timestamp(email.date, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let gist = email
        .summary
        .as_deref()
        .unwrap_or_else(|| email.preview(120));

    println!("{}. [id {}] {}", rank, email.id, email.subject);
    println!("    from: {}", email.from_address);
    println!("    date: {}", date);
    println!("    {}", gist.replace('\n', " "));
    println!();
}

async fn run_get(cfg: &Config, id: i64) -> Result<()> {
    let store = open_store(cfg).await?;
    let email = match store.get_email(id).await? {
        Some(email) => email,
        None => bail!("email not found: {}", id),
    };

    println!("--- Email ---");
    println!("id:         {}", email.id);
    println!("message_id: {}", email.message_id);
    println!("thread_id:  {}", email.thread_id);
    println!("subject:    {}", email.subject);
    println!("from:       {}", email.from_address);
    println!("to:         {}", email.to_addresses);
    if let Some(ref cc) = email.cc_addresses {
        println!("cc:         {}", cc);
    }
    let date = chrono::DateTime::from_timestamp(email.date, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default();
    println!("date:       {}", date);
    println!();

    if let Some(ref summary) = email.summary {
        println!("--- Summary ---");
        println!("{}", summary);
        println!();
    }

    println!("--- Body ---");
    println!("{}", email.plain_text);
    Ok(())
}

async fn run_recent(cfg: &Config, limit: Option<usize>) -> Result<()> {
    let store = open_store(cfg).await?;
    let limit = limit.unwrap_or(cfg.retrieval.final_limit);
    let results = store.list_recent(limit).await?;

    if results.is_empty() {
        println!("No emails stored yet. Run `mailmind sync` first.");
        return Ok(());
    }

    for (i, email) in results.iter().enumerate() {
        print_email_line(i + 1, email);
    }
    Ok(())
}

async fn run_chat(cfg: &Config, one_shot: Option<String>) -> Result<()> {
    if !cfg.generation.is_enabled() {
        bail!("chat requires a generation provider; set [generation] in config");
    }

    let store = open_store(cfg).await?;
    let search = build_search_service(cfg, store)?;
    let generator = create_generator(&cfg.generation)?;
    let chat = ChatService::new(search, generator);
    let top_k = cfg.retrieval.chat_top_k;

    if let Some(message) = one_shot {
        let history = vec![ChatMessage::new("user", message)];
        let reply = chat.chat_with_emails(&history, top_k).await?;
        println!("{}", reply);
        return Ok(());
    }

    println!("Starting mailmind chat. Type 'exit' to quit.");
    let stdin = std::io::stdin();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        history.push(ChatMessage::new("user", message));
        let reply = chat.chat_with_emails(&history, top_k).await?;
        println!("mailmind: {}", reply);
        history.push(ChatMessage::new("assistant", reply));
    }
    Ok(())
}

async fn run_draft(cfg: &Config, instruction: &str, about: Option<&str>) -> Result<()> {
    if !cfg.generation.is_enabled() {
        bail!("draft requires a generation provider; set [generation] in config");
    }

    let store = open_store(cfg).await?;
    let search = build_search_service(cfg, store)?;
    let generator = create_generator(&cfg.generation)?;
    let drafting = DraftingService::new(search, generator);

    let draft = drafting.draft_email(instruction, about).await?;
    println!("{}", draft);
    Ok(())
}
