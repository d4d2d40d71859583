//! Fixed-size overlapping text windows.
//!
//! Splits normalized document text into windows of at most `max_size`
//! characters, advancing by `max_size - overlap` characters each step.
//! Offsets are counted in `char`s, never bytes, so multi-byte text is never
//! cut inside a code point.
//!
//! Each chunk gets a deterministic id derived from its document id and
//! index, plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk overlap ({overlap}) must be smaller than the window size ({max_size})")]
    InvalidWindow { max_size: usize, overlap: usize },
}

/// Split `text` into overlapping windows.
///
/// Windows start at char offsets `0, s, 2s, ...` with `s = max_size - overlap`
/// and continue while the offset is inside the text. The last window may be
/// shorter than `max_size`. Empty text yields no windows.
///
/// Fails before doing any work when `overlap >= max_size`.
pub fn chunk_windows(text: &str, max_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    if max_size == 0 || overlap >= max_size {
        return Err(ChunkError::InvalidWindow { max_size, overlap });
    }
    let stride = max_size - overlap;

    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    Ok((0..char_len)
        .step_by(stride)
        .map(|start| {
            let end = (start + max_size).min(char_len);
            text[bounds[start]..bounds[end]].to_string()
        })
        .collect())
}

/// Split a document's text into [`Chunk`]s with contiguous indices from 0.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    max_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    Ok(chunk_windows(text, max_size, overlap)?
        .into_iter()
        .enumerate()
        .map(|(index, window)| make_chunk(document_id, index, window))
        .collect())
}

pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}-chunk-{}", document_id, index)
}

fn make_chunk(document_id: &str, index: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        index,
        text,
        hash,
        embedding: None,
    }
}
