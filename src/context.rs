//! Low-level token estimation and truncation helpers.
//!
//! These are the primitives `compaction::CompactionEngine` builds on; they're
//! also exported directly for hosts that want manual, non-automatic history
//! management instead of the scheduler's built-in compaction.
//!
//! # Features
//!
//! - Token estimation (character-based approximation)
//! - Last-N message truncation
//!
//! The system prompt is never part of `history` in this data model (it lives
//! in `ProviderOptions::system_prompt`), so truncation has no special case to
//! preserve it — it's just "keep the last N messages".

use crate::message::{ContentBlock, Message};

/// Estimate token count for message list
///
/// Uses character-based approximation (1 token ≈ 4 characters).
///
/// # Arguments
///
/// * `messages` - List of messages to estimate tokens for
///
/// # Returns
///
/// Estimated token count
///
/// # Note
///
/// This is an APPROXIMATION. Actual token counts vary by model family:
/// - GPT models: ~70-85% accurate (different tokenizers)
/// - Llama, Qwen, Mistral: ~70-85% accurate
/// - Always include 10-20% safety margin when checking limits
///
/// For more accurate estimation, consider using tiktoken bindings
/// (not included to keep dependencies minimal).
///
/// # Examples
///
/// ```rust
/// use open_agent::{Message, estimate_tokens};
///
/// let messages = vec![Message::user("Hello!")];
///
/// let tokens = estimate_tokens(&messages);
/// println!("Estimated tokens: {}", tokens);
///
/// // Check if approaching context limit
/// if tokens > 28000 {
///     println!("Need to truncate!");
/// }
/// ```
pub fn estimate_tokens(messages: &[Message]) -> usize {
    // Character-based approximation: 1 token ≈ 4 characters
    // This is a conservative estimate that works across model families

    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;

    for message in messages {
        // Count role overhead (approximately 1-2 tokens)
        total_chars += 8; // ~2 tokens for role formatting

        for block in message.content() {
            match block {
                ContentBlock::Text { text } | ContentBlock::Thinking { text } => {
                    total_chars += text.len();
                }
                ContentBlock::Image { data, media_type, .. } => {
                    // base64 data dominates; media type is negligible but counted
                    total_chars += data.len() + media_type.len();
                }
                ContentBlock::ToolCall(call) => {
                    total_chars += call.name.len();
                    total_chars += call.id.len();
                    total_chars += call.arguments.to_string().len();
                }
            }
        }

        if let Message::ToolResult { call_id, tool_name, .. } = message {
            total_chars += call_id.len() + tool_name.len();
        }
    }

    // Add conversation-level overhead (~2-4 tokens)
    total_chars += 16;

    // Convert characters to tokens (4 chars ≈ 1 token, round up for safety)
    (total_chars + 3) / 4 // Ceiling division
}

/// Truncate message history, keeping recent messages
///
/// Keeps the most recent N messages. The system prompt is never part of
/// `history` in this data model (see module docs), so there is no
/// separate "preserve system" case. This is a simple truncation - it does
/// NOT attempt to preserve tool chains or important context; prefer
/// `compaction::CompactionEngine` when tool-call/tool-result pairing must
/// survive the cut.
///
/// # Arguments
///
/// * `messages` - List of messages to truncate
/// * `keep` - Number of recent messages to keep
///
/// # Returns
///
/// Truncated message list (new Vec, original unchanged)
///
/// # Examples
///
/// ```rust
/// use open_agent::{Message, truncate_messages, estimate_tokens};
///
/// let history = vec![Message::user("Hello!"), Message::user("How are you?")];
/// let tokens = estimate_tokens(&history);
/// let kept = if tokens > 28000 {
///     truncate_messages(&history, 10)
/// } else {
///     history
/// };
/// ```
///
/// # Note
///
/// This is a SIMPLE truncation. For domain-specific needs (e.g.,
/// preserving tool call chains, keeping important context), implement
/// your own logic or use this as a starting point.
///
/// Warning: Truncating mid-conversation may remove context that the
/// model needs to properly respond. Use judiciously at natural breakpoints.
pub fn truncate_messages(messages: &[Message], keep: usize) -> Vec<Message> {
    if messages.is_empty() || keep == 0 {
        return Vec::new();
    }

    if messages.len() <= keep {
        return messages.to_vec();
    }

    let start = messages.len().saturating_sub(keep);
    messages[start..].to_vec()
}

/// Check if history is approaching a token limit
///
/// Convenience function that combines estimation with a threshold check.
///
/// # Arguments
///
/// * `messages` - Messages to check
/// * `limit` - Token limit (e.g., 32000 for a 32k context window)
/// * `margin` - Safety margin as a percentage (default: 0.9 = 90%)
///
/// # Returns
///
/// `true` if estimated tokens exceed limit * margin
///
/// # Examples
///
/// ```rust
/// use open_agent::{is_approaching_limit, Message};
///
/// # fn example(messages: Vec<Message>) {
/// if is_approaching_limit(&messages, 32000, 0.9) {
///     println!("Time to truncate!");
/// }
/// # }
/// ```
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_estimate_tokens_empty() {
        let messages: Vec<Message> = vec![];
        assert_eq!(estimate_tokens(&messages), 0);
    }

    #[test]
    fn test_estimate_tokens_simple() {
        let messages = vec![Message::user("Hello world")];

        let tokens = estimate_tokens(&messages);
        // "Hello world" = 11 chars + overhead ≈ 5-8 tokens
        assert!(tokens >= 3 && tokens <= 10);
    }

    #[test]
    fn test_truncate_messages_empty() {
        let messages: Vec<Message> = vec![];
        let truncated = truncate_messages(&messages, 10);
        assert_eq!(truncated.len(), 0);
    }

    #[test]
    fn test_truncate_messages_keeps_last_n() {
        let messages = vec![
            Message::user("Message 1"),
            Message::user("Message 2"),
            Message::user("Message 3"),
            Message::user("Message 4"),
        ];

        let truncated = truncate_messages(&messages, 2);

        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].text(), "Message 3");
        assert_eq!(truncated[1].text(), "Message 4");
    }

    #[test]
    fn test_truncate_messages_keep_zero() {
        let messages = vec![Message::user("Message 1")];
        let truncated = truncate_messages(&messages, 0);
        assert_eq!(truncated.len(), 0);
    }

    #[test]
    fn test_truncate_messages_keep_all() {
        let messages = vec![Message::user("Message 1"), Message::user("Message 2")];

        let truncated = truncate_messages(&messages, 10);
        assert_eq!(truncated.len(), 2);
    }

    #[test]
    fn test_is_approaching_limit() {
        let messages = vec![Message::user("x".repeat(1000))];

        // ~250 tokens, should not exceed 90% of 1000
        assert!(!is_approaching_limit(&messages, 1000, 0.9));

        // Should exceed 90% of 200
        assert!(is_approaching_limit(&messages, 200, 0.9));
    }
}
