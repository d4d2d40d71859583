//! Study aids generated from the knowledge base: flashcards, summaries and
//! multiple-choice quizzes.
//!
//! Each operation retrieves context for a topic, asks the completion model,
//! and (for flashcards and quizzes) parses the reply with a
//! [`CompletionParser`]. When nothing relevant is found the model is not
//! called: flashcards and quizzes come back empty and the summary is a fixed
//! notice.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::LearningConfig;
use crate::context::assemble;
use crate::llm::{CompletionClient, CompletionOptions};
use crate::models::{Flashcard, QuizItem};
use crate::parse::CompletionParser;
use crate::prompts;
use crate::retrieve::KnowledgeRetriever;
use crate::store::SearchFilter;

pub const NO_SUMMARY: &str = "I couldn't find any relevant information to summarize.";
pub const SUMMARY_FAILED: &str = "Sorry, I encountered an error while trying to create a summary.";

const FLASHCARD_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.5,
    max_tokens: 1000,
};
const SUMMARY_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.3,
    max_tokens: 1000,
};
const QUIZ_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.5,
    max_tokens: 1500,
};

pub struct LearningTools {
    retriever: Arc<KnowledgeRetriever>,
    llm: Arc<dyn CompletionClient>,
    parser: Arc<dyn CompletionParser>,
    config: LearningConfig,
}

impl LearningTools {
    pub fn new(
        retriever: Arc<KnowledgeRetriever>,
        llm: Arc<dyn CompletionClient>,
        parser: Arc<dyn CompletionParser>,
        config: LearningConfig,
    ) -> Self {
        Self {
            retriever,
            llm,
            parser,
            config,
        }
    }

    /// Generate flashcards about `topic`. `count` defaults to the configured value.
    ///
    /// The model may return fewer well-formed cards than requested; only the
    /// ones that parse are returned.
    pub async fn flashcards(&self, topic: &str, count: Option<usize>) -> Result<Vec<Flashcard>> {
        let count = count.unwrap_or(self.config.flashcard_count);
        let Some(context) = self.context_for(topic, self.config.top_k).await? else {
            return Ok(Vec::new());
        };

        let messages = prompts::flashcard_messages(&context, topic, count);
        let reply = self
            .llm
            .complete(&messages, FLASHCARD_OPTIONS)
            .await
            .context("Flashcard generation failed")?;

        let cards = self.parser.parse_flashcards(&reply);
        tracing::info!(topic, requested = count, parsed = cards.len(), "flashcards generated");
        Ok(cards)
    }

    /// Summarize what the knowledge base says about `topic`.
    ///
    /// A completion failure is logged and reported as an apology text.
    pub async fn summary(&self, topic: &str) -> Result<String> {
        let Some(context) = self
            .context_for(topic, self.retriever.default_top_k())
            .await?
        else {
            return Ok(NO_SUMMARY.to_string());
        };

        let messages = prompts::summary_messages(&context, topic);
        match self.llm.complete(&messages, SUMMARY_OPTIONS).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::error!(model = self.llm.model_name(), error = %e, "summary generation failed");
                Ok(SUMMARY_FAILED.to_string())
            }
        }
    }

    /// Generate a multiple-choice quiz about `topic`. `count` defaults to the
    /// configured value.
    pub async fn quiz(&self, topic: &str, count: Option<usize>) -> Result<Vec<QuizItem>> {
        let count = count.unwrap_or(self.config.quiz_count);
        let Some(context) = self.context_for(topic, self.config.top_k).await? else {
            return Ok(Vec::new());
        };

        let messages = prompts::quiz_messages(&context, topic, count);
        let reply = self
            .llm
            .complete(&messages, QUIZ_OPTIONS)
            .await
            .context("Quiz generation failed")?;

        let items = self.parser.parse_quiz(&reply);
        tracing::info!(topic, requested = count, parsed = items.len(), "quiz generated");
        Ok(items)
    }

    async fn context_for(&self, topic: &str, top_k: usize) -> Result<Option<String>> {
        let results = self
            .retriever
            .search(topic, &SearchFilter::default(), top_k)
            .await?;
        if results.is_empty() {
            tracing::info!(topic, "no relevant content found");
            return Ok(None);
        }
        Ok(Some(assemble(&results)))
    }
}
