//! Wiring of stores, gateways and services into one [`KnowledgeBase`].
//!
//! [`KnowledgeBase::open`] builds the production stack from a [`Config`]:
//! SQLite for metadata and search, a directory for raw blobs, and the
//! configured embedding and completion providers. [`KnowledgeBase::from_parts`]
//! accepts any implementations of the boundaries, which is how tests run the
//! whole pipeline in memory.

use std::sync::Arc;

use anyhow::Result;

use crate::blob::{BlobStore, FsBlobStore};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_gateway, EmbeddingGateway};
use crate::http::build_client;
use crate::ingest::DocumentProcessor;
use crate::learning::LearningTools;
use crate::llm::{create_client, CompletionClient};
use crate::migrate;
use crate::parse::PatternParser;
use crate::retrieve::KnowledgeRetriever;
use crate::sqlite_store::SqliteStore;
use crate::store::{MetadataStore, SearchIndex};

/// Fetch timeout for web page ingestion.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// External collaborators of the services.
pub struct Parts {
    pub blobs: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub index: Arc<dyn SearchIndex>,
    pub embedder: Arc<dyn EmbeddingGateway>,
    pub llm: Arc<dyn CompletionClient>,
    pub http: reqwest::Client,
}

pub struct KnowledgeBase {
    pub processor: DocumentProcessor,
    pub retriever: Arc<KnowledgeRetriever>,
    pub learning: LearningTools,
    pub metadata: Arc<dyn MetadataStore>,
}

impl KnowledgeBase {
    /// Open the configured database (migrating it if needed) and providers.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        let store = Arc::new(SqliteStore::new(pool));

        let parts = Parts {
            blobs: Arc::new(FsBlobStore::new(&config.storage.root)),
            metadata: store.clone(),
            index: store,
            embedder: create_gateway(&config.embedding)?,
            llm: create_client(&config.llm)?,
            http: build_client(FETCH_TIMEOUT_SECS)?,
        };
        Self::from_parts(config, parts)
    }

    pub fn from_parts(config: &Config, parts: Parts) -> Result<Self> {
        let processor = DocumentProcessor::new(
            parts.blobs,
            parts.metadata.clone(),
            parts.index.clone(),
            parts.embedder.clone(),
            parts.http,
            config.chunking.clone(),
        )?;
        let retriever = Arc::new(KnowledgeRetriever::new(
            parts.index,
            parts.embedder,
            parts.llm.clone(),
            config.retrieval.clone(),
        ));
        let learning = LearningTools::new(
            retriever.clone(),
            parts.llm,
            Arc::new(PatternParser),
            config.learning.clone(),
        );

        Ok(Self {
            processor,
            retriever,
            learning,
            metadata: parts.metadata,
        })
    }
}
