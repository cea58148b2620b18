use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::chat::{ConversationTurn, Role};
use crate::search::SearchResultBundle;

pub const ASSISTANT_NAME: &str = "WebMind";

const SEARCH_SUMMARY_HEADER: &str = "Here are the web search results for your query:\n\n";

/// Generation parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// The ordered message list for one completion call.
///
/// The system instruction is always first, the search summary (when present)
/// second, then the conversation history in its original order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ConversationTurn>,
    pub params: GenerationParams,
}

impl CompletionRequest {
    pub fn last_message(&self) -> Option<&ConversationTurn> {
        self.messages.last()
    }
}

pub fn build_system_instruction(username: &str, current_date: NaiveDate) -> String {
    format!(
        "You are {ASSISTANT_NAME}, an advanced AI assistant with real web search capabilities talking to {username}. Today's date is {date}.

When answering questions:
1. Use the provided search results (if available) to give accurate, up-to-date information.
2. Include relevant facts, statistics, and citations when appropriate using [Source: Website] format.
3. For coding questions, provide modern, best-practice code examples.
4. Structure complex responses with clear headings and organized information.
5. If you're unsure about some information, acknowledge this rather than making up facts.

Your goal is to provide the most helpful, accurate, and comprehensive response possible.",
        date = current_date.format("%Y-%m-%d"),
    )
}

/// Renders a search bundle as one text block.
///
/// Sections appear in a fixed order: featured answer, knowledge panel,
/// numbered search results, numbered related questions. Absent sections are
/// skipped without affecting the numbering of the others.
pub fn format_search_summary(bundle: &SearchResultBundle) -> String {
    let mut out = String::from(SEARCH_SUMMARY_HEADER);

    if let Some(ab) = &bundle.answer_box {
        let _ = writeln!(out, "FEATURED ANSWER: {}\n{}", ab.title, ab.answer);
        if !ab.source.is_empty() {
            let _ = writeln!(out, "[Source: {}]\n", ab.source);
        }
    }

    if let Some(kg) = &bundle.knowledge_graph {
        let _ = writeln!(out, "KNOWLEDGE PANEL: {} - {}", kg.title, kg.kind);
        let _ = writeln!(out, "{}\n", kg.description);
    }

    if !bundle.organic_results.is_empty() {
        out.push_str("SEARCH RESULTS:\n");
        for (i, result) in bundle.organic_results.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, result.title);
            let _ = writeln!(out, "   {}", result.snippet);
            let _ = writeln!(out, "   [Source: {}]\n", result.source);
        }
    }

    if !bundle.related_questions.is_empty() {
        out.push_str("PEOPLE ALSO ASK:\n");
        for (i, question) in bundle.related_questions.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, question.question);
            let _ = writeln!(out, "   {}", question.answer);
            if !question.source.is_empty() {
                let _ = writeln!(out, "   [Source: {}]", question.source);
            }
        }
    }

    out
}

pub fn compose(
    system_instruction: &str,
    search_summary: Option<&str>,
    history: &[ConversationTurn],
    params: GenerationParams,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ConversationTurn::new(Role::System, system_instruction));
    if let Some(summary) = search_summary {
        messages.push(ConversationTurn::new(Role::System, summary));
    }
    messages.extend(history.iter().cloned());

    CompletionRequest { messages, params }
}
