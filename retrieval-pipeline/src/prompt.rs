use common::storage::types::{
    chat_message::{ConversationTurn, MessageRole},
    content_node::ContentNode,
};

use crate::budget::estimate_tokens;

pub static DEFAULT_PHILOSOPHY_SYSTEM_PROMPT: &str = r#"You are a careful scholar of philosophy. You will be given numbered passages retrieved from primary and secondary texts, and possibly excerpts from documents the user uploaded, followed by the user's question.

Your task is to:
1. Answer the question using the provided passages as your primary evidence
2. Refer to passages by their number, e.g. [2], when you rely on them
3. Distinguish clearly between what a text says and your own interpretation of it
4. Say so plainly when the passages do not support a confident answer
5. Prefer the user's own documents when they speak directly to the question

Remember:
- Be precise with terminology and attribute ideas to the right thinker
- Do not invent quotations
- Keep the answer focused on the question asked"#;

pub static IMMERSIVE_SYSTEM_PROMPT_TEMPLATE: &str = r#"You are {persona}. Answer in the first person, in your own voice and from within your own philosophical commitments, as you would in conversation with a thoughtful student.

You will be given numbered passages from your writings and from commentary on them, and possibly excerpts from documents the student uploaded. Ground what you say in these passages and refer to them by number, e.g. [2]. When a question concerns ideas or events after your time, say how your principles would bear on it rather than pretending to knowledge you could not have had. Do not invent quotations."#;

/// Synthetic id prefix for document excerpts injected as system turns.
pub const DOC_CONTEXT_ID_PREFIX: &str = "doc_context_";

pub fn system_prompt(persona: Option<&str>) -> String {
    match persona.map(str::trim).filter(|p| !p.is_empty()) {
        Some(persona) => IMMERSIVE_SYSTEM_PROMPT_TEMPLATE.replace("{persona}", persona),
        None => DEFAULT_PHILOSOPHY_SYSTEM_PROMPT.to_string(),
    }
}

/// Splits user-document passages out as system turns `doc_context_{n}`.
/// Remaining passages keep their order.
pub fn document_turns(nodes: Vec<ContentNode>) -> (Vec<ConversationTurn>, Vec<ContentNode>) {
    let mut turns = Vec::new();
    let mut passages = Vec::new();

    for node in nodes {
        if !node.is_user_document() {
            passages.push(node);
            continue;
        }
        let Some(text) = node.content() else {
            continue;
        };
        let label = node.filename().unwrap_or("uploaded document");
        turns.push(ConversationTurn::new(
            format!("{DOC_CONTEXT_ID_PREFIX}{}", turns.len() + 1),
            MessageRole::System,
            format!("Excerpt from the user's document \"{label}\":\n{text}"),
        ));
    }

    (turns, passages)
}

pub fn format_passages(nodes: &[ContentNode]) -> String {
    if nodes.is_empty() {
        return "(no passages)".to_string();
    }

    nodes
        .iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let text = node.content()?;
            let source = node.source().or_else(|| node.filename());
            Some(match source {
                Some(source) => format!("[{}] ({source}) {text}", index + 1),
                None => format!("[{}] {text}", index + 1),
            })
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn create_user_message(passages: &str, query: &str) -> String {
    format!(
        r"
        Passages:
        ==================
        {passages}

        Question:
        ==================
        {query}
        "
    )
}

/// Drops trailing passages until the request is estimated to fit `window`.
/// Returns how many were dropped.
pub fn fit_to_window(
    nodes: &mut Vec<ContentNode>,
    history: &[ConversationTurn],
    query: &str,
    window: usize,
) -> usize {
    let query_chars = query.chars().count();
    let mut dropped = 0;
    while !nodes.is_empty() && estimate_tokens(nodes, history, query_chars) > window {
        nodes.pop();
        dropped += 1;
    }
    dropped
}
