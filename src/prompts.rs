//! Chat messages for each generating operation.
//!
//! Every prompt puts the assembled context in the user message. Flashcard and
//! quiz prompts spell out the plain-text layout that [`crate::parse`] reads.

use crate::llm::ChatMessage;

pub fn answer_messages(context: &str, query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You answer questions from the user's personal knowledge base. \
             Use only the context provided. If the context does not contain the answer, \
             say that you do not know. Mention the title of each document you rely on.",
        ),
        ChatMessage::user(format!("Context:\n{}\n\nQuestion: {}", context, query)),
    ]
}

pub fn flashcard_messages(context: &str, topic: &str, count: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You write study flashcards from the context provided. \
             Write {count} flashcards covering the key concepts of the topic. \
             Use exactly this layout for each card:\n\
             Flashcard N:\nQ: <question>\nA: <answer>"
        )),
        ChatMessage::user(format!(
            "Context:\n{}\n\nTopic: {}\nCreate {} flashcards.",
            context, topic, count
        )),
    ]
}

pub fn summary_messages(context: &str, topic: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You write concise, well-structured summaries of the context provided, \
             keeping the main points and the important details.",
        ),
        ChatMessage::user(format!(
            "Context:\n{}\n\nSummarize what the context says about: {}",
            context, topic
        )),
    ]
}

pub fn quiz_messages(context: &str, topic: &str, count: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You write multiple-choice quizzes from the context provided. \
             Write {count} questions about the topic, each with four options and one correct answer. \
             Use exactly this layout for each question:\n\
             Question N: <question>\nOptions:\nA. <option>\nB. <option>\nC. <option>\nD. <option>\n\
             Answer: <letter>"
        )),
        ChatMessage::user(format!(
            "Context:\n{}\n\nTopic: {}\nCreate {} multiple-choice questions.",
            context, topic, count
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_context_goes_in_user_message() {
        let messages = answer_messages("Title: X\nContent: Y", "what is X?");
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(
            messages[1].content,
            "Context:\nTitle: X\nContent: Y\n\nQuestion: what is X?"
        );
    }

    #[test]
    fn test_counts_are_interpolated() {
        assert!(flashcard_messages("c", "t", 7)[0].content.contains("Write 7 flashcards"));
        assert!(quiz_messages("c", "t", 3)[1].content.ends_with("Create 3 multiple-choice questions."));
    }
}
