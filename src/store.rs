//! Storage boundaries for document metadata and the search index.
//!
//! The [`MetadataStore`] trait owns [`Document`] records; the [`SearchIndex`]
//! trait owns embedded chunks and answers hybrid (keyword + vector) queries.
//! Both are async (via `async-trait`) and `Send + Sync` so they can be shared
//! as `Arc<dyn ...>` between the ingest and retrieval services.
//!
//! Backends:
//!
//! | Type | Module |
//! |------|--------|
//! | `SqliteStore` | [`crate::sqlite_store`] (FTS5 + BLOB vectors) |
//! | `InMemoryStore` | [`crate::memory`] |
//!
//! The ranking helpers in this module are shared by both backends so that
//! they order results identically.

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Chunk, Document, RetrievalResult, SourceKind};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// All documents, most recently created first.
    async fn list_documents(&self) -> Result<Vec<Document>>;
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Add one embedded chunk to the index.
    async fn index_chunk(&self, chunk: &IndexedChunk) -> Result<()>;

    /// Ranked results for a query, at most `query.top_k`, best first.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalResult>>;
}

/// A chunk ready for indexing: text, vector and its document's attribution.
///
/// Only built from chunks that carry an embedding, so an index never holds a
/// chunk without a vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    pub hash: String,
    pub vector: Vec<f32>,
    pub title: String,
    pub source_kind: SourceKind,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IndexedChunk {
    /// Returns `None` when the chunk has no embedding.
    pub fn from_embedded(document: &Document, chunk: &Chunk) -> Option<Self> {
        let vector = chunk.embedding.clone()?;
        Some(Self {
            chunk_id: chunk.id.clone(),
            document_id: document.id.clone(),
            index: chunk.index,
            text: chunk.text.clone(),
            hash: chunk.hash.clone(),
            vector,
            title: document.title.clone(),
            source_kind: document.source_kind,
            url: document.url.clone(),
            created_at: document.created_at,
        })
    }

    pub fn to_result(&self, score: f64) -> RetrievalResult {
        RetrievalResult {
            chunk_id: self.chunk_id.clone(),
            document_id: self.document_id.clone(),
            title: self.title.clone(),
            content: self.text.clone(),
            source_kind: self.source_kind,
            url: self.url.clone(),
            created_at: self.created_at,
            score,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub vector: Vec<f32>,
    pub filter: SearchFilter,
    pub top_k: usize,
    /// Weight of the vector score in `[0, 1]`; the keyword score gets the rest.
    pub hybrid_alpha: f64,
    /// Candidates fetched from each channel before blending.
    pub candidate_k: usize,
}

/// Restricts search to a source kind and/or a creation date range.
///
/// The date range only applies when both ends are set; a half-open range is
/// ignored. Clauses combine with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub source_kind: Option<SourceKind>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.source_kind.is_none() && self.date_range().is_none()
    }

    /// Inclusive range, present only when both ends are set.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    pub fn matches(&self, source_kind: SourceKind, created_at: DateTime<Utc>) -> bool {
        if let Some(kind) = self.source_kind {
            if kind != source_kind {
                return false;
            }
        }
        if let Some((from, to)) = self.date_range() {
            if created_at < from || created_at > to {
                return false;
            }
        }
        true
    }

    /// Human-readable form, e.g. `source_kind eq 'web' and created_at ge ...`.
    pub fn expression(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(kind) = self.source_kind {
            clauses.push(format!("source_kind eq '{}'", kind));
        }
        if let Some((from, to)) = self.date_range() {
            clauses.push(format!("created_at ge {}", from.to_rfc3339()));
            clauses.push(format!("created_at le {}", to.to_rfc3339()));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" and "))
        }
    }
}

// ============ Ranking ============

/// A result from one retrieval channel, before blending.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    /// BM25-derived or cosine score; higher is better within one channel.
    pub raw_score: f64,
    pub result: RetrievalResult,
}

/// Min-max normalize raw scores into `[0, 1]`.
///
/// A channel whose scores are all equal maps every candidate to `1.0`.
pub fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<f64> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Blend keyword and vector candidates into one ranked list.
///
/// `score = (1 - alpha) * keyword + alpha * vector`, with a missing channel
/// counting as 0. Sorted by score descending, then chunk id ascending so that
/// ties are deterministic.
pub fn hybrid_rank(
    keyword: Vec<ChunkCandidate>,
    vector: Vec<ChunkCandidate>,
    alpha: f64,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let kw_scores = normalize_scores(&keyword);
    let vec_scores = normalize_scores(&vector);

    // chunk_id -> (keyword, vector, result)
    let mut merged: HashMap<String, (f64, f64, RetrievalResult)> = HashMap::new();
    for (cand, k) in keyword.into_iter().zip(kw_scores) {
        merged
            .entry(cand.result.chunk_id.clone())
            .or_insert((0.0, 0.0, cand.result))
            .0 = k;
    }
    for (cand, v) in vector.into_iter().zip(vec_scores) {
        merged
            .entry(cand.result.chunk_id.clone())
            .or_insert((0.0, 0.0, cand.result))
            .1 = v;
    }

    let mut results: Vec<RetrievalResult> = merged
        .into_values()
        .map(|(k, v, mut result)| {
            result.score = (1.0 - alpha) * k + alpha * v;
            result
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(top_k);
    results
}

/// Lowercased alphanumeric terms of a query.
pub fn query_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// FTS5 MATCH expression: every term quoted, any term may match.
///
/// Quoting keeps user punctuation from being read as FTS syntax.
pub fn fts_match_expression(text: &str) -> Option<String> {
    let terms = query_terms(text);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(chunk_id: &str, score: f64) -> ChunkCandidate {
        ChunkCandidate {
            raw_score: score,
            result: RetrievalResult {
                chunk_id: chunk_id.to_string(),
                document_id: "d".to_string(),
                title: "t".to_string(),
                content: String::new(),
                source_kind: SourceKind::Note,
                url: None,
                created_at: Utc::now(),
                score: 0.0,
            },
        }
    }

    fn ids(results: &[RetrievalResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_range() {
        let scores = normalize_scores(&[
            candidate("c1", 10.0),
            candidate("c2", 5.0),
            candidate("c3", 0.0),
        ]);
        assert!((scores[0] - 1.0).abs() < 1e-9);
        assert!((scores[1] - 0.5).abs() < 1e-9);
        assert!(scores[2].abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_equal() {
        let scores = normalize_scores(&[candidate("c1", 3.0), candidate("c2", 3.0)]);
        assert!(scores.iter().all(|s| (*s - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_alpha_zero_is_keyword_order() {
        let kw = vec![candidate("c1", 10.0), candidate("c2", 5.0), candidate("c3", 1.0)];
        let vec = vec![candidate("c3", 0.9), candidate("c1", 0.1)];
        let ranked = hybrid_rank(kw, vec, 0.0, 10);
        assert_eq!(ids(&ranked), vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_alpha_one_is_vector_order() {
        let kw = vec![candidate("c1", 10.0), candidate("c2", 5.0)];
        let vec = vec![candidate("c1", 0.1), candidate("c2", 0.9), candidate("c3", 0.5)];
        let ranked = hybrid_rank(kw, vec, 1.0, 10);
        assert_eq!(ids(&ranked), vec!["c2", "c3", "c1"]);
    }

    #[test]
    fn test_rank_truncates_and_breaks_ties_by_id() {
        let vec = vec![candidate("b", 1.0), candidate("a", 1.0), candidate("c", 1.0)];
        let ranked = hybrid_rank(Vec::new(), vec, 0.5, 2);
        assert_eq!(ids(&ranked), vec!["a", "b"]);
        assert!((ranked[0].score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_filter_half_open_range_ignored() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = SearchFilter {
            source_kind: None,
            date_from: Some(from),
            date_to: None,
        };
        assert!(filter.is_empty());
        assert!(filter.matches(SourceKind::Web, from - chrono::Duration::days(30)));
        assert_eq!(filter.expression(), None);
    }

    #[test]
    fn test_filter_matches_kind_and_range() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let filter = SearchFilter {
            source_kind: Some(SourceKind::Web),
            date_from: Some(from),
            date_to: Some(to),
        };
        let inside = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert!(filter.matches(SourceKind::Web, inside));
        assert!(filter.matches(SourceKind::Web, from));
        assert!(!filter.matches(SourceKind::Note, inside));
        assert!(!filter.matches(SourceKind::Web, to + chrono::Duration::seconds(1)));

        let expr = filter.expression().unwrap();
        assert!(expr.starts_with("source_kind eq 'web' and created_at ge 2024-01-01"));
        assert_eq!(expr.matches(" and ").count(), 2);
    }

    #[test]
    fn test_fts_expression_quotes_terms() {
        assert_eq!(
            fts_match_expression("Rust's \"borrow\" checker?").as_deref(),
            Some("\"rust\" OR \"s\" OR \"borrow\" OR \"checker\"")
        );
        assert_eq!(fts_match_expression("  ?! "), None);
    }

    #[test]
    fn test_indexed_chunk_requires_embedding() {
        let doc = Document {
            id: "d".to_string(),
            title: "T".to_string(),
            source_kind: SourceKind::Note,
            url: None,
            file_ext: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        };
        let mut chunk = crate::chunk::chunk_document("d", "hello", 10, 2).unwrap().remove(0);
        assert!(IndexedChunk::from_embedded(&doc, &chunk).is_none());

        chunk.embedding = Some(vec![1.0, 0.0]);
        let indexed = IndexedChunk::from_embedded(&doc, &chunk).unwrap();
        assert_eq!(indexed.chunk_id, "d-chunk-0");
        assert_eq!(indexed.to_result(0.7).content, "hello");
    }
}
