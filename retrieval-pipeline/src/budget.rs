use common::storage::types::{chat_message::ConversationTurn, content_node::ContentNode};
use serde::Serialize;

/// Rough characters-per-token ratio used for estimates.
pub const CHARS_PER_TOKEN: usize = 4;
/// Headroom for the system prompt, message framing and the answer itself.
pub const BUFFER_TOKENS: usize = 512;
/// Window sizes between the default and the maximum are rounded up to this step.
pub const WINDOW_STEP: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowTier {
    Default,
    Expanded,
    Maximum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextBudgetDecision {
    pub window_size: usize,
    pub estimated_tokens: usize,
    pub tier: WindowTier,
    /// Set when the content does not fit even the largest window.
    pub truncation_expected: bool,
    pub rationale: String,
}

/// Estimated token count for a query plus its context.
pub fn estimate_tokens(
    nodes: &[ContentNode],
    history: &[ConversationTurn],
    query_length_chars: usize,
) -> usize {
    let node_chars: usize = nodes.iter().map(ContentNode::content_len).sum();
    let history_chars: usize = history.iter().map(ConversationTurn::text_len).sum();
    let total_chars = query_length_chars
        .saturating_add(node_chars)
        .saturating_add(history_chars);

    (total_chars / CHARS_PER_TOKEN).saturating_add(BUFFER_TOKENS)
}

/// Picks a context window for the request. Pure; inputs are not touched.
pub fn compute(
    nodes: &[ContentNode],
    history: &[ConversationTurn],
    query_length_chars: usize,
    default_window: usize,
    max_window: usize,
) -> ContextBudgetDecision {
    let estimated_tokens = estimate_tokens(nodes, history, query_length_chars);
    let max_window = max_window.max(default_window);

    if estimated_tokens <= default_window {
        return ContextBudgetDecision {
            window_size: default_window,
            estimated_tokens,
            tier: WindowTier::Default,
            truncation_expected: false,
            rationale: format!(
                "estimated {estimated_tokens} tokens fit the default window of {default_window}"
            ),
        };
    }

    if estimated_tokens <= max_window {
        let rounded = estimated_tokens
            .div_ceil(WINDOW_STEP)
            .saturating_mul(WINDOW_STEP);
        let window_size = rounded.min(max_window);
        return ContextBudgetDecision {
            window_size,
            estimated_tokens,
            tier: WindowTier::Expanded,
            truncation_expected: false,
            rationale: format!(
                "estimated {estimated_tokens} tokens exceed the default window of {default_window}; \
                 expanded to {window_size} (rounded to {WINDOW_STEP}, capped at {max_window})"
            ),
        };
    }

    ContextBudgetDecision {
        window_size: max_window,
        estimated_tokens,
        tier: WindowTier::Maximum,
        truncation_expected: true,
        rationale: format!(
            "estimated {estimated_tokens} tokens exceed the maximum window of {max_window}; \
             context will be truncated"
        ),
    }
}
