//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for every input kind: raw storage → metadata record →
//! normalization → chunking → per-chunk embedding → indexing. Extraction and
//! embedding failures are non-fatal: they are logged, the document is still
//! recorded, and chunks without a vector are left out of the index.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::chunk::{chunk_document, chunk_windows};
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingGateway;
use crate::models::{Document, SourceKind};
use crate::normalize::{bytes_to_text, html_to_text, normalize, pdf_to_text, HtmlText};
use crate::store::{IndexedChunk, MetadataStore, SearchIndex};

const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; kbase/", env!("CARGO_PKG_VERSION"), ")");

/// Outcome of one ingest call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub content_id: String,
    pub title: String,
    /// Chunks produced from the normalized text.
    pub chunks: usize,
    /// Chunks that received a vector and were indexed.
    pub indexed: usize,
}

pub struct DocumentProcessor {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn EmbeddingGateway>,
    http: reqwest::Client,
    chunking: ChunkingConfig,
}

impl DocumentProcessor {
    /// Fails if the chunk window is invalid (`overlap >= max_size`).
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn EmbeddingGateway>,
        http: reqwest::Client,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        chunk_windows("", chunking.max_chars, chunking.overlap_chars)?;
        Ok(Self {
            blobs,
            metadata,
            index,
            embedder,
            http,
            chunking,
        })
    }

    /// Ingest a file from disk. The title defaults to the file name.
    pub async fn ingest_file(&self, path: &Path, title: Option<&str>) -> Result<IngestReceipt> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest_bytes(&filename, &bytes, title).await
    }

    /// Ingest uploaded file content.
    ///
    /// PDFs are extracted page by page; every other extension is decoded as
    /// UTF-8 text. The raw bytes are kept in blob storage under the content
    /// id and the lowercased extension.
    pub async fn ingest_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
        title: Option<&str>,
    ) -> Result<IngestReceipt> {
        let ext = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "txt".to_string());
        let source_kind = SourceKind::from_extension(&ext);

        let content_id = new_content_id();
        self.blobs.put(&content_id, &ext, bytes).await?;

        let raw = match source_kind {
            SourceKind::FilePdf => match pdf_to_text(bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(content_id = %content_id, filename, error = %e, "text extraction failed");
                    String::new()
                }
            },
            _ => bytes_to_text(bytes),
        };

        let doc = new_document(
            content_id,
            pick_title(title).unwrap_or(filename).to_string(),
            source_kind,
            None,
            Some(ext),
        );
        self.process(doc, &raw).await
    }

    /// Fetch a web page and ingest its visible text.
    ///
    /// Title precedence: the caller's title, the page `<title>`, the URL. A
    /// failed fetch is logged and the page is recorded with no text.
    pub async fn ingest_url(&self, url: &str, title: Option<&str>) -> Result<IngestReceipt> {
        let url = url.trim();
        if url.is_empty() {
            bail!("url must not be empty");
        }

        let page = match fetch_page(&self.http, url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url, error = %e, "failed to fetch page");
                HtmlText {
                    title: None,
                    text: String::new(),
                }
            }
        };

        let title = pick_title(title)
            .map(str::to_string)
            .or(page.title)
            .unwrap_or_else(|| url.to_string());

        let doc = new_document(
            new_content_id(),
            title,
            SourceKind::Web,
            Some(url.to_string()),
            None,
        );
        self.process(doc, &page.text).await
    }

    /// Ingest free text. The title defaults to `Note YYYY-MM-DD HH:MM`.
    pub async fn ingest_note(&self, text: &str, title: Option<&str>) -> Result<IngestReceipt> {
        let title = match pick_title(title) {
            Some(t) => t.to_string(),
            None => format!("Note {}", Utc::now().format("%Y-%m-%d %H:%M")),
        };
        let doc = new_document(new_content_id(), title, SourceKind::Note, None, None);
        self.process(doc, text).await
    }

    async fn process(&self, doc: Document, raw: &str) -> Result<IngestReceipt> {
        self.metadata.insert_document(&doc).await?;

        let text = normalize(raw);
        let mut chunks = chunk_document(
            &doc.id,
            &text,
            self.chunking.max_chars,
            self.chunking.overlap_chars,
        )?;

        let mut indexed = 0;
        for chunk in &mut chunks {
            chunk.embedding = self.embedder.embed(&chunk.text).await;
            if let Some(entry) = IndexedChunk::from_embedded(&doc, chunk) {
                self.index.index_chunk(&entry).await?;
                indexed += 1;
            }
        }

        if indexed < chunks.len() {
            tracing::warn!(
                content_id = %doc.id,
                skipped = chunks.len() - indexed,
                "chunks without embeddings were not indexed"
            );
        }
        tracing::info!(
            content_id = %doc.id,
            source_kind = %doc.source_kind,
            chunks = chunks.len(),
            indexed,
            "document ingested"
        );

        Ok(IngestReceipt {
            content_id: doc.id,
            title: doc.title,
            chunks: chunks.len(),
            indexed,
        })
    }
}

/// GET a page and extract its title and visible text.
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<HtmlText> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Fetching {} returned {}", url, status);
    }

    let html = response.text().await?;
    Ok(html_to_text(&html))
}

fn new_content_id() -> String {
    Uuid::new_v4().to_string()
}

fn new_document(
    id: String,
    title: String,
    source_kind: SourceKind,
    url: Option<String>,
    file_ext: Option<String>,
) -> Document {
    // Stored with second precision.
    let now = Utc::now().trunc_subsecs(0);
    Document {
        id,
        title,
        source_kind,
        url,
        file_ext,
        created_at: now,
        modified_at: now,
    }
}

fn pick_title(title: Option<&str>) -> Option<&str> {
    title.map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_title_ignores_blank() {
        assert_eq!(pick_title(Some("  My doc ")), Some("My doc"));
        assert_eq!(pick_title(Some("   ")), None);
        assert_eq!(pick_title(None), None);
    }

    #[test]
    fn test_new_document_second_precision() {
        let doc = new_document("id".into(), "t".into(), SourceKind::Note, None, None);
        assert_eq!(doc.created_at.timestamp_subsec_nanos(), 0);
        assert_eq!(doc.created_at, doc.modified_at);
    }
}
