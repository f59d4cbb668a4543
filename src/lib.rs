//! # mailmind
//!
//! A local-first email assistant: ingestion, hybrid search, chat, and
//! drafting over your mail archive.
//!
//! mailmind pulls mail from a provider, cleans HTML bodies to plain text,
//! optionally summarizes them, stores records in SQLite, and maintains two
//! indexes over the corpus — a persisted vector index for semantic search
//! and an in-memory inverted keyword index. Retrieval, chat, and drafting
//! are exposed via a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────┐   ┌─────────────┐
//! │   Mail    │──▶│ Clean +       │──▶│  SQLite   │──▶│ Coordinator │
//! │ Provider  │   │ Summarize     │   │  emails   │   │ embed+index │
//! └──────────┘   └───────────────┘   └────┬─────┘   └──────┬──────┘
//!                                          │                │
//!                                          ▼                ▼
//!                                    ┌──────────┐   ┌──────────────┐
//!                                    │ Retrieval │◀──│ Vector index │
//!                                    │  engine   │   │ Keyword index│
//!                                    └────┬─────┘   └──────────────┘
//!                        ┌────────────────┤
//!                        ▼                ▼
//!                  ┌──────────┐    ┌────────────┐
//!                  │   CLI    │    │ HTTP (JSON) │
//!                  └──────────┘    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mailmind init                          # create database
//! mailmind sync                          # fetch, store, and index mail
//! mailmind search "renewal" --mode hybrid
//! mailmind chat --message "what did legal say about the contract?"
//! mailmind serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Email record store (SQLite) |
//! | [`clean`] | HTML-to-text cleaning |
//! | [`mail`] | Mail provider client |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Persisted nearest-neighbor index |
//! | [`keyword_index`] | In-memory inverted index |
//! | [`indexer`] | Dual-index coordinator |
//! | [`retrieval`] | Keyword, semantic, and hybrid search |
//! | [`summarize`] | Email summarization |
//! | [`llm`] | Generative client (chat, drafting) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`chat`] | Retrieval-augmented chat |
//! | [`draft`] | Draft generation |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod clean;
pub mod config;
pub mod db;
pub mod draft;
pub mod embedding;
pub mod indexer;
pub mod ingest;
pub mod keyword_index;
pub mod llm;
pub mod mail;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod summarize;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod test_support;
