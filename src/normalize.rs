//! Turning heterogeneous content into clean plain text.
//!
//! [`normalize`] is the single whitespace policy every document goes through
//! before chunking. HTML and PDF helpers strip markup or extract page text
//! first; none of them panic on malformed input. PDF extraction reports
//! failure as [`ExtractError`] and leaves logging and fallback to the caller.

use scraper::{ElementRef, Html, Selector};

/// Containers tried, in order, as the primary content of a page.
const CONTENT_CONTAINERS: [&str; 3] = ["article", "main", "body"];

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Collapse every run of whitespace into a single space and trim the ends.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode an uploaded text-like file. Invalid UTF-8 is replaced, never rejected.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Visible text and title of an HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlText {
    pub title: Option<String>,
    pub text: String,
}

/// Extract the readable text of an HTML page.
///
/// Uses the first of `article`, `main`, `body` that holds any text, and
/// falls back to the whole document otherwise. Script and style content is
/// dropped. The result is already normalized.
pub fn html_to_text(html: &str) -> HtmlText {
    let doc = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .next()
                .map(|el| normalize(&el.text().collect::<Vec<_>>().join(" ")))
        })
        .filter(|t| !t.is_empty());

    for name in CONTENT_CONTAINERS {
        let Ok(sel) = Selector::parse(name) else {
            continue;
        };
        if let Some(container) = doc.select(&sel).next() {
            let text = visible_text(container);
            if !text.is_empty() {
                return HtmlText { title, text };
            }
        }
    }

    HtmlText {
        title,
        text: visible_text(doc.root_element()),
    }
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| SKIPPED_ELEMENTS.contains(&el.value().name()));
        if !hidden {
            let text: &str = text;
            parts.push(text);
        }
    }
    normalize(&parts.join("\n"))
}

/// Extract the text of each PDF page, in page order.
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed files instead of erroring.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("extractor panicked".to_string())),
    }
}

/// Concatenate page texts with no separator.
///
/// Page boundaries are not preserved; callers that need them use [`pdf_pages`].
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, ExtractError> {
    Ok(pdf_pages(bytes)?.concat())
}
