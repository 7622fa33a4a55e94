//! Prompt assembly from retrieved records.

use quill_common::ChatMessage;

use crate::types::PayloadRecord;

pub const DEFAULT_EMPTY_CONTEXT: &str = "I didn't find anything about that in your Journal.";

/// Render one record for the prompt context.
pub fn format_record(record: &PayloadRecord) -> String {
    let title = record.title();
    let timestamp = record.timestamp();
    let header = if timestamp.is_empty() {
        format!("📖 {title}")
    } else {
        format!("📖 {title} ({timestamp})")
    };
    format!("{header}\n{}", record.content())
}

/// Join records with blank lines, or fall back to `empty_context`.
pub fn build_context(records: &[PayloadRecord], empty_context: &str) -> String {
    if records.is_empty() {
        return empty_context.to_string();
    }
    records
        .iter()
        .map(format_record)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The user-turn text combining retrieved context and the question.
pub fn user_prompt(context: &str, question: &str) -> String {
    format!("**Relevant Journal Entries:**\n\n{context}\n\n**User Query:**\n{question}")
}

/// System and user messages for a retrieval-augmented turn.
pub fn assemble(
    system_prompt: &str,
    records: &[PayloadRecord],
    question: &str,
    empty_context: &str,
) -> [ChatMessage; 2] {
    let context = build_context(records, empty_context);
    [
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_prompt(&context, question)),
    ]
}
