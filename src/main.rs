//! # kbase CLI (`kb`)
//!
//! The `kb` binary drives the knowledge base from the shell: database
//! initialization, ingestion of files, web pages and notes, search, grounded
//! answers, study aids, and the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and run schema migrations |
//! | `kb ingest file <path>` | Ingest a PDF or text file |
//! | `kb ingest url <url>` | Fetch and ingest a web page |
//! | `kb ingest note "<text>"` | Ingest a free-text note |
//! | `kb search "<query>"` | Ranked retrieval results |
//! | `kb ask "<question>"` | Answer from the knowledge base, with sources |
//! | `kb flashcards "<topic>"` | Generate flashcards |
//! | `kb summary "<topic>"` | Summarize a topic |
//! | `kb quiz "<topic>"` | Generate a multiple-choice quiz |
//! | `kb serve` | Start the HTTP API server |
//!
//! Log output goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kbase::app::KnowledgeBase;
use kbase::config;
use kbase::ingest::IngestReceipt;
use kbase::migrate;
use kbase::models::{RetrievalResult, SourceKind};
use kbase::retrieve::FilterCriteria;
use kbase::server;

/// kbase CLI: a personal knowledge base with grounded answers and study aids.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "kbase: a personal knowledge base with grounded answers and study aids",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Safe to run
    /// more than once.
    Init,

    /// Add content to the knowledge base.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Search the knowledge base.
    Search {
        query: String,

        /// Only return results of this kind: `file-pdf`, `file-text`, `web`, `note`.
        #[arg(long)]
        source_kind: Option<SourceKind>,

        /// Start of the creation date range (YYYY-MM-DD or RFC 3339).
        /// Applies only together with `--to`.
        #[arg(long)]
        from: Option<String>,

        /// End of the creation date range (inclusive).
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question using the knowledge base.
    Ask {
        question: String,

        #[arg(long)]
        source_kind: Option<SourceKind>,
    },

    /// Generate flashcards about a topic.
    Flashcards {
        topic: String,

        /// Number of cards to request (defaults to `[learning].flashcard_count`).
        #[arg(long)]
        count: Option<usize>,
    },

    /// Summarize what the knowledge base says about a topic.
    Summary { topic: String },

    /// Generate a multiple-choice quiz about a topic.
    Quiz {
        topic: String,

        /// Number of questions to request (defaults to `[learning].quiz_count`).
        #[arg(long)]
        count: Option<usize>,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IngestSource {
    /// Ingest a file from disk (PDF, or anything decodable as text).
    File {
        path: PathBuf,
        #[arg(long)]
        title: Option<String>,
    },
    /// Fetch a web page and ingest its visible text.
    Url {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Ingest a free-text note.
    Note {
        text: String,
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .try_init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        command => {
            let kb = KnowledgeBase::open(&cfg).await?;
            run_command(&kb, command).await?;
        }
    }

    Ok(())
}

async fn run_command(kb: &KnowledgeBase, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { source } => {
            let receipt = match source {
                IngestSource::File { path, title } => {
                    kb.processor.ingest_file(&path, title.as_deref()).await?
                }
                IngestSource::Url { url, title } => {
                    kb.processor.ingest_url(&url, title.as_deref()).await?
                }
                IngestSource::Note { text, title } => {
                    kb.processor.ingest_note(&text, title.as_deref()).await?
                }
            };
            print_receipt(&receipt);
        }
        Commands::Search {
            query,
            source_kind,
            from,
            to,
            limit,
        } => {
            let filter = FilterCriteria {
                source_kind,
                date_from: from,
                date_to: to,
            }
            .into_filter()?;
            let top_k = limit.unwrap_or(kb.retriever.default_top_k());
            let results = kb.retriever.search(&query, &filter, top_k).await?;
            print_results(&results);
        }
        Commands::Ask {
            question,
            source_kind,
        } => {
            let filter = FilterCriteria {
                source_kind,
                ..Default::default()
            }
            .into_filter()?;
            let answer = kb.retriever.answer(&question, &filter).await?;
            println!("{}", answer.answer.trim());
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for (i, source) in answer.sources.iter().enumerate() {
                    match &source.url {
                        Some(url) => println!("  [{}] {} ({})", i + 1, source.title, url),
                        None => println!("  [{}] {} [{}]", i + 1, source.title, source.source_kind),
                    }
                }
            }
        }
        Commands::Flashcards { topic, count } => {
            let cards = kb.learning.flashcards(&topic, count).await?;
            if cards.is_empty() {
                println!("No flashcards.");
            }
            for (i, card) in cards.iter().enumerate() {
                println!("{}. Q: {}", i + 1, card.question);
                println!("   A: {}", card.answer);
                println!();
            }
        }
        Commands::Summary { topic } => {
            println!("{}", kb.learning.summary(&topic).await?.trim());
        }
        Commands::Quiz { topic, count } => {
            let quiz = kb.learning.quiz(&topic, count).await?;
            if quiz.is_empty() {
                println!("No quiz questions.");
            }
            for item in &quiz {
                println!("Question {}: {}", item.question_number, item.question);
                for (letter, text) in &item.options {
                    println!("  {}. {}", letter, text);
                }
                println!("  Answer: {}", item.correct_answer);
                println!();
            }
        }
        Commands::Init | Commands::Serve => unreachable!("handled before opening the knowledge base"),
    }
    Ok(())
}

fn print_receipt(receipt: &IngestReceipt) {
    println!("Ingested \"{}\"", receipt.title);
    println!("    id: {}", receipt.content_id);
    println!("    chunks: {} ({} indexed)", receipt.chunks, receipt.indexed);
}

fn print_results(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            result.source_kind,
            result.title
        );
        println!("    created: {}", result.created_at.format("%Y-%m-%d"));
        if let Some(ref url) = result.url {
            println!("    url: {}", url);
        }
        let excerpt: String = result.content.chars().take(200).collect();
        println!("    excerpt: \"{}\"", excerpt.trim());
        println!("    chunk: {}", result.chunk_id);
        println!();
    }
}
