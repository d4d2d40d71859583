//! # kbase
//!
//! A personal knowledge base with retrieval-augmented answers and study aids.
//!
//! Files, web pages and notes are normalized, chunked, embedded and indexed
//! in SQLite (FTS5 keyword index plus stored vectors). Queries run a filtered
//! hybrid search and feed the best chunks to a completion model, which answers
//! questions or produces flashcards, summaries and quizzes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────┐
//! │   Inputs    │──▶│   Ingestion      │──▶│  SQLite   │
//! │ File/URL/   │   │ Normalize+Chunk  │   │ FTS5+Vec  │
//! │ Note        │   │ +Embed           │   └─────┬─────┘
//! └─────────────┘   └──────────────────┘         │
//!                                                ▼
//!                   ┌──────────────────┐   ┌───────────┐
//!                   │ Learning tools   │◀──│ Retriever │
//!                   │ cards/summary/   │   │ hybrid +  │
//!                   │ quiz             │   │ answers   │
//!                   └────────┬─────────┘   └─────┬─────┘
//!                            └─────────┬─────────┘
//!                               ┌──────┴──────┐
//!                               ▼             ▼
//!                          ┌─────────┐   ┌─────────┐
//!                          │   CLI   │   │  HTTP   │
//!                          │  (kb)   │   │  (API)  │
//!                          └─────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb init
//! kb ingest file ./notes/raft.pdf
//! kb ingest url https://example.com/article
//! kb ask "How does leader election work?"
//! kb flashcards "leader election" --count 5
//! kb serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Whitespace normalization, HTML and PDF text extraction |
//! | [`chunk`] | Overlapping character windows |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat completion provider abstraction |
//! | [`store`] | Storage traits, filters and hybrid ranking |
//! | [`sqlite_store`] | SQLite metadata store and search index |
//! | [`memory`] | In-memory metadata store and search index |
//! | [`blob`] | Raw content storage |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Search and grounded answers |
//! | [`context`] | Prompt context assembly |
//! | [`prompts`] | Prompt construction |
//! | [`parse`] | Flashcard and quiz parsing |
//! | [`learning`] | Flashcards, summaries and quizzes |
//! | [`app`] | Service wiring |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod blob;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod learning;
pub mod llm;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod parse;
pub mod prompts;
pub mod retrieve;
pub mod server;
pub mod sqlite_store;
pub mod store;
