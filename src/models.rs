//! Core data models used throughout kbase.
//!
//! These types represent the documents, chunks, retrieval results and
//! study records that flow through the ingestion and retrieval pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a document's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// An uploaded PDF file.
    FilePdf,
    /// An uploaded file decoded as UTF-8 text (txt, md, doc, docx, ...).
    FileText,
    /// A fetched web page.
    Web,
    /// Free text typed in by the user.
    Note,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::FilePdf => "file-pdf",
            SourceKind::FileText => "file-text",
            SourceKind::Web => "web",
            SourceKind::Note => "note",
        }
    }

    /// Classify an uploaded file by its (case-insensitive) extension.
    pub fn from_extension(ext: &str) -> Self {
        if ext.eq_ignore_ascii_case("pdf") {
            SourceKind::FilePdf
        } else {
            SourceKind::FileText
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file-pdf" => Ok(SourceKind::FilePdf),
            "file-text" => Ok(SourceKind::FileText),
            "web" => Ok(SourceKind::Web),
            "note" => Ok(SourceKind::Note),
            other => anyhow::bail!(
                "Unknown source kind: '{}'. Must be file-pdf, file-text, web, or note.",
                other
            ),
        }
    }
}

/// Metadata record for one ingested piece of content.
///
/// Immutable once created except for `modified_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source_kind: SourceKind,
    pub url: Option<String>,
    /// Extension the raw bytes were stored under in blob storage, if any.
    pub file_ext: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A window of a document's normalized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `"{document_id}-chunk-{index}"`.
    pub id: String,
    pub document_id: String,
    /// 0-based position; the only ordering key.
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Attached after a successful embedding call.
    pub embedding: Option<Vec<f32>>,
}

/// A ranked chunk together with its parent document's attribution fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub title: String,
    pub content: String,
    pub source_kind: SourceKind,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Opaque relevance score; higher is better.
    pub score: f64,
}

/// A question/answer pair. Both fields are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

/// One multiple-choice question parsed from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    /// Number exactly as the model wrote it.
    pub question_number: String,
    pub question: String,
    pub options: BTreeMap<char, String>,
    /// Letter as parsed; not checked against `options`.
    pub correct_answer: char,
}

/// Attribution entry returned alongside a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub source_kind: SourceKind,
    pub url: Option<String>,
}

impl From<&RetrievalResult> for SourceRef {
    fn from(result: &RetrievalResult) -> Self {
        Self {
            title: result.title.clone(),
            source_kind: result.source_kind,
            url: result.url.clone().filter(|u| !u.is_empty()),
        }
    }
}

/// A grounded answer with one source per retrieved chunk, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_through_str() {
        for kind in [
            SourceKind::FilePdf,
            SourceKind::FileText,
            SourceKind::Web,
            SourceKind::Note,
        ] {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("pdf".parse::<SourceKind>().is_err());
    }

    #[test]
    fn source_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&SourceKind::FilePdf).unwrap();
        assert_eq!(json, "\"file-pdf\"");
    }

    #[test]
    fn extension_classification() {
        assert_eq!(SourceKind::from_extension("PDF"), SourceKind::FilePdf);
        assert_eq!(SourceKind::from_extension("docx"), SourceKind::FileText);
        assert_eq!(SourceKind::from_extension(""), SourceKind::FileText);
    }

    #[test]
    fn source_ref_drops_empty_url() {
        let result = RetrievalResult {
            chunk_id: "d-chunk-0".to_string(),
            document_id: "d".to_string(),
            title: "T".to_string(),
            content: "C".to_string(),
            source_kind: SourceKind::Note,
            url: Some(String::new()),
            created_at: Utc::now(),
            score: 1.0,
        };
        assert_eq!(SourceRef::from(&result).url, None);
    }
}
