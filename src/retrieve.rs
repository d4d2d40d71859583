//! Query-time retrieval and grounded answers.
//!
//! [`KnowledgeRetriever::search`] embeds the query and runs a filtered hybrid
//! search. [`KnowledgeRetriever::answer`] assembles the results into a
//! context, asks the completion model, and returns the answer together with
//! one source per result.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::config::RetrievalConfig;
use crate::context::assemble;
use crate::embedding::EmbeddingGateway;
use crate::llm::{CompletionClient, CompletionOptions};
use crate::models::{Answer, RetrievalResult, SourceKind, SourceRef};
use crate::prompts;
use crate::store::{SearchFilter, SearchIndex, SearchQuery};

pub const NO_ANSWER: &str = "I couldn't find any relevant information in your knowledge base.";
pub const ANSWER_FAILED: &str =
    "Sorry, I encountered an error while trying to answer your question.";

const ANSWER_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.3,
    max_tokens: 1000,
};

/// Filter as supplied by API and CLI callers.
///
/// Dates are RFC 3339 timestamps or plain `YYYY-MM-DD` days; a plain
/// `date_to` covers the whole day.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub source_kind: Option<SourceKind>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

impl FilterCriteria {
    pub fn into_filter(self) -> Result<SearchFilter> {
        Ok(SearchFilter {
            source_kind: self.source_kind,
            date_from: self
                .date_from
                .as_deref()
                .map(|s| parse_date(s, NaiveTime::default()))
                .transpose()?,
            date_to: self
                .date_to
                .as_deref()
                .map(|s| parse_date(s, end_of_day()))
                .transpose()?,
        })
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::default())
}

fn parse_date(s: &str, day_time: NaiveTime) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(day) => Ok(day.and_time(day_time).and_utc()),
        Err(_) => bail!("Invalid date '{}': expected YYYY-MM-DD or RFC 3339", s),
    }
}

pub struct KnowledgeRetriever {
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn EmbeddingGateway>,
    llm: Arc<dyn CompletionClient>,
    config: RetrievalConfig,
}

impl KnowledgeRetriever {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn EmbeddingGateway>,
        llm: Arc<dyn CompletionClient>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            config,
        }
    }

    /// Results used for answers and summaries by default.
    pub fn default_top_k(&self) -> usize {
        self.config.top_k
    }

    /// Ranked results for `query`, at most `top_k`.
    ///
    /// Returns an empty list when the query is blank or cannot be embedded.
    pub async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let Some(vector) = self.embedder.embed(query).await else {
            tracing::warn!("query embedding unavailable, returning no results");
            return Ok(Vec::new());
        };

        if let Some(expr) = filter.expression() {
            tracing::debug!(filter = %expr, "applying search filter");
        }

        let results = self
            .index
            .search(&SearchQuery {
                text: query.to_string(),
                vector,
                filter: filter.clone(),
                top_k,
                hybrid_alpha: self.config.hybrid_alpha,
                candidate_k: self.config.candidate_k.max(top_k),
            })
            .await?;

        tracing::debug!(results = results.len(), "search complete");
        Ok(results)
    }

    /// Answer a question from the knowledge base.
    ///
    /// With no relevant results the answer is a fixed notice and no model is
    /// called. A completion failure is logged and answered with an apology;
    /// the sources are still returned.
    pub async fn answer(&self, query: &str, filter: &SearchFilter) -> Result<Answer> {
        let results = self.search(query, filter, self.config.top_k).await?;
        if results.is_empty() {
            return Ok(Answer {
                answer: NO_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = assemble(&results);
        let messages = prompts::answer_messages(&context, query);
        let answer = match self.llm.complete(&messages, ANSWER_OPTIONS).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(model = self.llm.model_name(), error = %e, "answer generation failed");
                ANSWER_FAILED.to_string()
            }
        };

        Ok(Answer {
            answer,
            sources: results.iter().map(SourceRef::from).collect(),
        })
    }
}
