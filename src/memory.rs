//! In-memory [`MetadataStore`] and [`SearchIndex`] for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Keyword search
//! counts query-term occurrences per chunk; vector search is brute-force
//! cosine similarity over every indexed chunk.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Document, RetrievalResult};
use crate::store::{
    hybrid_rank, query_terms, ChunkCandidate, IndexedChunk, MetadataStore, SearchIndex,
    SearchQuery,
};

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> Result<usize> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks.len())
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

fn keyword_score(terms: &[String], text: &str) -> f64 {
    let chunk_terms = query_terms(text);
    terms
        .iter()
        .map(|t| chunk_terms.iter().filter(|c| *c == t).count())
        .sum::<usize>() as f64
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut all: Vec<Document> = docs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[async_trait]
impl SearchIndex for InMemoryStore {
    async fn index_chunk(&self, chunk: &IndexedChunk) -> Result<()> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        chunks.retain(|c| c.chunk_id != chunk.chunk_id);
        chunks.push(chunk.clone());
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalResult>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let terms = query_terms(&query.text);

        let eligible: Vec<&IndexedChunk> = chunks
            .iter()
            .filter(|c| query.filter.matches(c.source_kind, c.created_at))
            .collect();

        let mut keyword: Vec<ChunkCandidate> = eligible
            .iter()
            .filter_map(|c| {
                let score = keyword_score(&terms, &c.text);
                (score > 0.0).then(|| ChunkCandidate {
                    raw_score: score,
                    result: c.to_result(0.0),
                })
            })
            .collect();
        keyword.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
        keyword.truncate(query.candidate_k);

        let mut vector: Vec<ChunkCandidate> = eligible
            .iter()
            .map(|c| ChunkCandidate {
                raw_score: cosine_similarity(&query.vector, &c.vector) as f64,
                result: c.to_result(0.0),
            })
            .collect();
        vector.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
        vector.truncate(query.candidate_k);

        Ok(hybrid_rank(keyword, vector, query.hybrid_alpha, query.top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use crate::store::SearchFilter;
    use chrono::{TimeZone, Utc};

    fn indexed(id: &str, kind: SourceKind, day: u32, text: &str, vector: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk_id: format!("{}-chunk-0", id),
            document_id: id.to_string(),
            index: 0,
            text: text.to_string(),
            hash: String::new(),
            vector,
            title: id.to_string(),
            source_kind: kind,
            url: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
        }
    }

    fn query(text: &str, vector: Vec<f32>, filter: SearchFilter) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            vector,
            filter,
            top_k: 5,
            hybrid_alpha: 0.5,
            candidate_k: 50,
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for chunk in [
            indexed("rust", SourceKind::Note, 1, "rust ownership and borrowing", vec![1.0, 0.0]),
            indexed("web", SourceKind::Web, 10, "cooking pasta at home", vec![0.0, 1.0]),
            indexed("pdf", SourceKind::FilePdf, 20, "rust async runtimes", vec![0.8, 0.2]),
        ] {
            store.index_chunk(&chunk).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_search_ranks_matching_chunks_first() {
        let store = seeded().await;
        let results = store
            .search(&query("rust ownership", vec![1.0, 0.0], SearchFilter::default()))
            .await
            .unwrap();
        assert_eq!(results[0].document_id, "rust");
        assert_eq!(results.last().unwrap().document_id, "web");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_applies_filter() {
        let store = seeded().await;
        let filter = SearchFilter {
            source_kind: Some(SourceKind::Web),
            ..Default::default()
        };
        let results = store.search(&query("rust", vec![1.0, 0.0], filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "web");

        let filter = SearchFilter {
            source_kind: None,
            date_from: Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()),
            date_to: Some(Utc.with_ymd_and_hms(2024, 3, 25, 0, 0, 0).unwrap()),
        };
        let results = store.search(&query("rust", vec![1.0, 0.0], filter)).await.unwrap();
        let docs: Vec<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(docs, vec!["pdf", "web"]);
    }

    #[tokio::test]
    async fn test_reindex_replaces_chunk() {
        let store = seeded().await;
        store
            .index_chunk(&indexed("rust", SourceKind::Note, 1, "replaced", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(store.chunk_count().unwrap(), 3);
    }

    #[test]
    fn test_chunk_count_reports_poisoned_lock() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let writer = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = writer.chunks.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        let err = store.chunk_count().unwrap_err();
        assert!(err.to_string().contains("poisoned"));
    }

    #[tokio::test]
    async fn test_documents_newest_first() {
        let store = InMemoryStore::new();
        for (id, day) in [("a", 1), ("b", 3), ("c", 2)] {
            let at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
            store
                .insert_document(&Document {
                    id: id.to_string(),
                    title: id.to_string(),
                    source_kind: SourceKind::Note,
                    url: None,
                    file_ext: None,
                    created_at: at,
                    modified_at: at,
                })
                .await
                .unwrap();
        }
        let ids: Vec<String> = store
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(store.get_document("zzz").await.unwrap().is_none());
    }
}
