//! SQLite-backed [`MetadataStore`] and [`SearchIndex`].
//!
//! Keyword candidates come from the `chunks_fts` FTS5 table (BM25 rank);
//! vector candidates are scored by brute-force cosine similarity over the
//! `chunk_vectors` BLOBs. Both channels join `documents` so that the search
//! filter is applied before ranking.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Document, RetrievalResult, SourceKind};
use crate::store::{
    fts_match_expression, hybrid_rank, ChunkCandidate, IndexedChunk, MetadataStore, SearchFilter,
    SearchIndex, SearchQuery,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool whose schema has already been migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn keyword_candidates(&self, query: &SearchQuery) -> Result<Vec<ChunkCandidate>> {
        let Some(expr) = fts_match_expression(&query.text) else {
            return Ok(Vec::new());
        };
        let (filter_sql, range) = filter_clause(&query.filter, 3);

        let sql = format!(
            r#"
            SELECT chunks_fts.chunk_id AS chunk_id, chunks_fts.document_id AS document_id,
                   chunks_fts.text AS text, chunks_fts.rank AS rank,
                   d.title, d.source_kind, d.url, d.created_at
            FROM chunks_fts
            JOIN documents d ON d.id = chunks_fts.document_id
            WHERE chunks_fts MATCH ?1{}
            ORDER BY chunks_fts.rank
            LIMIT ?2
            "#,
            filter_sql
        );

        let mut q = sqlx::query(&sql)
            .bind(expr)
            .bind(query.candidate_k as i64);
        q = bind_filter(q, &query.filter, range);

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<ChunkCandidate> {
                let rank: f64 = row.try_get("rank")?;
                Ok(ChunkCandidate {
                    // FTS5 rank is lower-is-better; negate so higher = better
                    raw_score: -rank,
                    result: row_to_result(row)?,
                })
            })
            .collect()
    }

    async fn vector_candidates(&self, query: &SearchQuery) -> Result<Vec<ChunkCandidate>> {
        let (filter_sql, range) = filter_clause(&query.filter, 1);

        let sql = format!(
            r#"
            SELECT cv.chunk_id AS chunk_id, cv.document_id AS document_id, cv.embedding,
                   c.text AS text, d.title, d.source_kind, d.url, d.created_at
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            WHERE 1 = 1{}
            "#,
            filter_sql
        );

        let q = bind_filter(sqlx::query(&sql), &query.filter, range);
        let rows = q.fetch_all(&self.pool).await?;

        let mut candidates = rows
            .iter()
            .map(|row| -> Result<ChunkCandidate> {
                let blob: Vec<u8> = row.try_get("embedding")?;
                let similarity = cosine_similarity(&query.vector, &blob_to_vec(&blob)) as f64;
                Ok(ChunkCandidate {
                    raw_score: similarity,
                    result: row_to_result(row)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        candidates.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
        candidates.truncate(query.candidate_k);
        Ok(candidates)
    }
}

/// SQL for the filter's clauses, using numbered parameters from `first_param`.
///
/// Returns the clause text and whether a date range was included, so that
/// [`bind_filter`] binds the same parameters in the same order.
fn filter_clause(filter: &SearchFilter, first_param: usize) -> (String, bool) {
    let mut sql = String::new();
    let mut next = first_param;
    if filter.source_kind.is_some() {
        sql.push_str(&format!(" AND d.source_kind = ?{}", next));
        next += 1;
    }
    let range = filter.date_range().is_some();
    if range {
        sql.push_str(&format!(
            " AND d.created_at >= ?{} AND d.created_at <= ?{}",
            next,
            next + 1
        ));
    }
    (sql, range)
}

fn bind_filter<'q>(
    mut q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &SearchFilter,
    range: bool,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(kind) = filter.source_kind {
        q = q.bind(kind.as_str());
    }
    if let (true, Some((from, to))) = (range, filter.date_range()) {
        q = q.bind(from.timestamp()).bind(to.timestamp());
    }
    q
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).with_context(|| format!("Invalid timestamp: {}", secs))
}

fn row_to_result(row: &SqliteRow) -> Result<RetrievalResult> {
    let kind: String = row.try_get("source_kind")?;
    Ok(RetrievalResult {
        chunk_id: row.try_get("chunk_id")?,
        document_id: row.try_get("document_id")?,
        title: row.try_get("title")?,
        content: row.try_get("text")?,
        source_kind: kind.parse::<SourceKind>()?,
        url: row.try_get("url")?,
        created_at: timestamp(row.try_get("created_at")?)?,
        score: 0.0,
    })
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let kind: String = row.try_get("source_kind")?;
    Ok(Document {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        source_kind: kind.parse::<SourceKind>()?,
        url: row.try_get("url")?,
        file_ext: row.try_get("file_ext")?,
        created_at: timestamp(row.try_get("created_at")?)?,
        modified_at: timestamp(row.try_get("modified_at")?)?,
    })
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, source_kind, url, file_ext, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(doc.source_kind.as_str())
        .bind(&doc.url)
        .bind(&doc.file_ext)
        .bind(doc.created_at.timestamp())
        .bind(doc.modified_at.timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document {}", doc.id))?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, source_kind, url, file_ext, created_at, modified_at \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, title, source_kind, url, file_ext, created_at, modified_at \
             FROM documents ORDER BY created_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }
}

#[async_trait]
impl SearchIndex for SqliteStore {
    async fn index_chunk(&self, chunk: &IndexedChunk) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, chunk_index, text, hash)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET text = excluded.text, hash = excluded.hash
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.document_id)
        .bind(chunk.index as i64)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
            .bind(&chunk.chunk_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, text) VALUES (?, ?, ?)")
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_id)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, document_id, dims, embedding)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET dims = excluded.dims, embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.document_id)
        .bind(chunk.vector.len() as i64)
        .bind(vec_to_blob(&chunk.vector))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalResult>> {
        let keyword = self.keyword_candidates(query).await?;
        let vector = self.vector_candidates(query).await?;
        Ok(hybrid_rank(keyword, vector, query.hybrid_alpha, query.top_k))
    }
}
