//! Prompt context assembly from ranked retrieval results.

use crate::models::RetrievalResult;

/// Format results into the context block handed to the completion model.
///
/// One `Title:`/`Content:` block per result in the order given, separated by
/// a blank line. Nothing is re-ranked, deduplicated or truncated.
pub fn assemble(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| format!("Title: {}\nContent: {}", r.title, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
