//! Parsing free-text model output into flashcards and quiz items.
//!
//! Completions are plain text, so structure is recovered with patterns.
//! Matching is best effort: a block that does not fit the expected shape
//! yields no record, and the remaining blocks are still parsed.
//!
//! Callers depend on [`CompletionParser`] so the matching strategy can change
//! without touching them. [`PatternParser`] is the regex implementation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Flashcard, QuizItem};

/// Turns completion text into structured study records.
pub trait CompletionParser: Send + Sync {
    fn parse_flashcards(&self, text: &str) -> Vec<Flashcard>;
    fn parse_quiz(&self, text: &str) -> Vec<QuizItem>;
}

/// Regex-based [`CompletionParser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternParser;

impl CompletionParser for PatternParser {
    fn parse_flashcards(&self, text: &str) -> Vec<Flashcard> {
        parse_flashcards(text)
    }

    fn parse_quiz(&self, text: &str) -> Vec<QuizItem> {
        parse_quiz(text)
    }
}

// Optional "Flashcard N" label, Q/Question marker, shortest question text,
// then the A/Answer marker. Markers must stand alone as words so that
// capitals inside a question ("RAG") are not taken for the answer marker.
// The answer itself is delimited separately.
static CARD_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:Flashcard\s*\d+:?\s*)?\bQ(?:uestion)?\b:?\s*(.*?)\s*\bA(?:nswer)?\b:?")
        .expect("valid flashcard regex")
});

// Start of the next card: a new line opening with a question marker.
static CARD_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n\s*(?:Flashcard\s*\d+:?\s*)?Q(?:uestion)?:").expect("valid boundary regex")
});

// Only labels that open a line start a block; "Question 2" inside a
// question's text is part of that question.
static QUIZ_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Question\s*\d+").expect("valid quiz label regex")
});

// One complete quiz block, anchored at its label: exactly four option lines
// followed by the answer letter.
static QUIZ_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\A[ \t]*Question\s*(\d+):?\s*(.*?)\r?\n(?:Options|Choices):?\s*\n((?:[ \t]*[A-D](?:[.):]|[ \t])[^\r\n]*\r?\n){4})[ \t]*(?:Correct Answer|Answer):?\s*([A-D])",
    )
    .expect("valid quiz block regex")
});

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*([A-D])(?:[.):]|[ \t]|$)[ \t]*(.*)$").expect("valid option regex")
});

/// Extract question/answer pairs in order of appearance.
///
/// An answer runs until the next line that starts a new question, or the end
/// of the text. Cards with an empty question or answer are dropped. A
/// question marker with no answer before the next card yields nothing.
pub fn parse_flashcards(text: &str) -> Vec<Flashcard> {
    let mut cards = Vec::new();
    let mut pos = 0;

    while let Some(caps) = CARD_HEAD.captures_at(text, pos) {
        let (Some(head), Some(question)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        // The question ran into another card: this one has no answer.
        if let Some(next) = CARD_BOUNDARY.find(question.as_str()) {
            pos = question.start() + next.start() + 1;
            continue;
        }

        let answer_end = CARD_BOUNDARY
            .find_at(text, head.end())
            .map(|m| m.start())
            .unwrap_or(text.len());

        let question = question.as_str().trim();
        let answer = text[head.end()..answer_end].trim();
        if !question.is_empty() && !answer.is_empty() {
            cards.push(Flashcard {
                question: question.to_string(),
                answer: answer.to_string(),
            });
        }

        if answer_end >= text.len() {
            break;
        }
        pos = answer_end;
    }

    cards
}

/// Extract multiple-choice questions in order of appearance.
///
/// The text is split at `Question N` labels that open a line, and each block must match the
/// full structure on its own: question, an `Options:` line, exactly four
/// lettered option lines and the answer letter. Malformed blocks are skipped.
pub fn parse_quiz(text: &str) -> Vec<QuizItem> {
    let starts: Vec<usize> = QUIZ_LABEL.find_iter(text).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            parse_quiz_block(&text[start..end])
        })
        .collect()
}

fn parse_quiz_block(block: &str) -> Option<QuizItem> {
    let caps = QUIZ_BLOCK.captures(block)?;
    let question_number = caps.get(1)?.as_str().to_string();
    let question = caps.get(2)?.as_str().trim().to_string();
    let options = parse_options(caps.get(3)?.as_str());
    let correct_answer = caps.get(4)?.as_str().chars().next()?;

    if question.is_empty() {
        return None;
    }

    Some(QuizItem {
        question_number,
        question,
        options,
        correct_answer,
    })
}

/// Map option letters to their text.
///
/// A line that starts with a letter marker opens an option; any other line is
/// appended to the option before it.
pub fn parse_options(text: &str) -> BTreeMap<char, String> {
    let mut options: BTreeMap<char, String> = BTreeMap::new();
    let mut current: Option<char> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(caps) = OPTION_LINE.captures(line) {
            let letter = caps
                .get(1)
                .and_then(|m| m.as_str().chars().next());
            if let Some(letter) = letter {
                let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                options.insert(letter, body.to_string());
                current = Some(letter);
                continue;
            }
        }
        if let Some(entry) = current.and_then(|letter| options.get_mut(&letter)) {
            entry.push('\n');
            entry.push_str(line);
        }
    }

    for value in options.values_mut() {
        *value = value.trim().to_string();
    }
    options
}
