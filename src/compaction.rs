//! Context-compaction engine.
//!
//! Prevents runaway context growth by periodically replacing the oldest
//! stretch of history with a synthetic summary message. The scheduler
//! calls [`CompactionEngine::maybe_compact`] once per turn, before building
//! the provider request; if it returns `Some`, the scheduler swaps its
//! in-memory history for the result and records a `CompactionEntry` in the
//! session log (the engine itself is not aware of the session log — it
//! only returns the index the scheduler needs to find the corresponding
//! entry id).

use crate::error::Result;
use crate::message::{ContentBlock, Message, StopReason};
use crate::provider::{Provider, ProviderOptions};
use crate::types::CompactionConfig;
use futures::StreamExt;

/// Wraps a summary in the marker the scheduler replays as a synthetic user
/// message, and that `session::replay` recognizes on reload.
pub fn compaction_marker(summary: &str) -> String {
    format!(
        "The conversation history before this point was compacted into the following summary: <summary>{summary}</summary>"
    )
}

/// Result of a successful compaction pass.
pub struct CompactionResult {
    /// New in-memory history: one synthetic user message followed by the
    /// kept tail, verbatim.
    pub history: Vec<Message>,
    /// Index into the *original* history of the first message that was
    /// kept (i.e. the cut point) — the scheduler resolves this to a
    /// session entry id.
    pub first_kept_index: usize,
    /// The raw summary text (without the marker wrapper), stored so the
    /// next compaction pass can feed it back in as prior context.
    pub summary: String,
    /// Estimated token count of the history before compaction, recorded on
    /// the session's `CompactionEntry`.
    pub tokens_before: u64,
}

/// Stateless token-estimation and cut-point logic, plus summary synthesis
/// via a caller-supplied provider. Holds no data itself; every call is
/// given the history, config, and (for synthesis) a provider reference
/// fresh, so it composes cleanly with the scheduler's own locking.
pub struct CompactionEngine;

impl CompactionEngine {
    /// Estimate per-message byte-based token cost, consistent with
    /// `context::estimate_tokens`'s single-message accounting.
    fn estimate_message_tokens(message: &Message) -> u64 {
        let mut chars = 8usize; // role overhead
        for block in message.content() {
            match block {
                ContentBlock::Text { text } | ContentBlock::Thinking { text } => {
                    chars += text.len();
                }
                ContentBlock::Image { data, media_type, .. } => {
                    chars += data.len() + media_type.len();
                }
                ContentBlock::ToolCall(call) => {
                    chars += call.name.len() + call.id.len() + call.arguments.to_string().len();
                }
            }
        }
        if let Message::ToolResult { call_id, tool_name, .. } = message {
            chars += call_id.len() + tool_name.len();
        }
        ((chars + 3) / 4) as u64
    }

    /// Estimated total tokens: usage-reported cost of the last
    /// assistant message that reported usage, recomputed-from-text if
    /// larger, plus a trailing byte/4 estimate for everything appended
    /// since. Aborted assistant messages contribute nothing even in the
    /// trailing sum.
    pub fn estimate_tokens(history: &[Message]) -> u64 {
        let last_usage_index = history.iter().rposition(|m| {
            matches!(m, Message::Assistant { usage, .. } if usage.total() > 0)
        });

        let (base, trailing_start) = match last_usage_index {
            Some(idx) => {
                let msg = &history[idx];
                let usage_total = match msg {
                    Message::Assistant { usage, .. } => usage.total(),
                    _ => 0,
                };
                let recomputed = Self::estimate_message_tokens(msg);
                (usage_total.max(recomputed), idx + 1)
            }
            None => (0, 0),
        };

        let trailing: u64 = history[trailing_start..]
            .iter()
            .filter(|m| !matches!(m, Message::Assistant { stop_reason: StopReason::Aborted, .. }))
            .map(Self::estimate_message_tokens)
            .sum();

        base + trailing
    }

    /// Whether compaction should run before the next provider call.
    pub fn should_compact(history: &[Message], config: &CompactionConfig) -> bool {
        if !config.enabled {
            return false;
        }
        let estimated = Self::estimate_tokens(history);
        let threshold = config.context_window.saturating_sub(config.reserve_tokens);
        estimated > threshold
    }

    /// Walk from the end accumulating estimated tokens until
    /// `keep_recent_tokens` is reached, then advance forward to the next
    /// user-message boundary. Returns `None` if no valid cut point exists.
    fn select_cut_point(history: &[Message], keep_recent_tokens: u64) -> Option<usize> {
        if history.len() < 2 {
            return None;
        }

        let mut accumulated = 0u64;
        let mut cut = history.len();
        for (i, message) in history.iter().enumerate().rev() {
            accumulated += Self::estimate_message_tokens(message);
            cut = i;
            if accumulated >= keep_recent_tokens {
                break;
            }
        }

        while cut < history.len() && !matches!(history[cut], Message::User { .. }) {
            cut += 1;
        }

        if cut == 0 || cut >= history.len() {
            None
        } else {
            Some(cut)
        }
    }

    /// Serialize the messages before the cut into a role-tagged transcript
    /// for the summarization call.
    fn render_transcript(messages: &[Message]) -> String {
        let mut out = String::new();
        for message in messages {
            match message {
                Message::User { .. } => {
                    out.push_str("[USER]\n");
                    out.push_str(&message.text());
                    out.push_str("\n\n");
                }
                Message::Assistant { content, .. } => {
                    for block in content {
                        match block {
                            ContentBlock::Text { text } | ContentBlock::Thinking { text } => {
                                out.push_str("[ASSISTANT]\n");
                                out.push_str(text);
                                out.push_str("\n\n");
                            }
                            ContentBlock::ToolCall(call) => {
                                out.push_str(&format!("[TOOL CALL: {}]\n", call.name));
                                out.push_str(&call.arguments.to_string());
                                out.push_str("\n\n");
                            }
                            ContentBlock::Image { .. } => {
                                out.push_str("[ASSISTANT]\n(image content omitted)\n\n");
                            }
                        }
                    }
                }
                Message::ToolResult { tool_name, .. } => {
                    out.push_str(&format!("[TOOL RESULT: {tool_name}]\n"));
                    out.push_str(&message.text());
                    out.push_str("\n\n");
                }
            }
        }
        out
    }

    /// Run the full trigger → cut-point → synthesis pipeline. Returns
    /// `Ok(None)` if compaction isn't needed or no valid cut point exists
    /// (both are normal, non-error outcomes).
    pub async fn maybe_compact(
        history: &[Message],
        config: &CompactionConfig,
        provider: &dyn Provider,
        model: &str,
        prior_summary: Option<&str>,
    ) -> Result<Option<CompactionResult>> {
        if !Self::should_compact(history, config) {
            return Ok(None);
        }

        let Some(cut) = Self::select_cut_point(history, config.keep_recent_tokens) else {
            return Ok(None);
        };

        let tokens_before = Self::estimate_tokens(history);
        let transcript = Self::render_transcript(&history[..cut]);

        let mut prompt = String::new();
        if let Some(prior) = prior_summary {
            prompt.push_str("Previous summary of earlier conversation:\n");
            prompt.push_str(prior);
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Summarize the following conversation transcript concisely, preserving facts, \
             decisions, and unresolved tasks a future assistant turn would need:\n\n",
        );
        prompt.push_str(&transcript);

        let ephemeral_history = vec![Message::user(prompt)];
        let options = ProviderOptions::default();
        let mut stream = provider.stream(model, &ephemeral_history, &options).await?;
        while stream.events.next().await.is_some() {}
        let summary_message = stream
            .result
            .await
            .map_err(|_| crate::error::Error::compaction("summary call's result channel dropped"))??;

        let summary = summary_message.text();

        let mut new_history = Vec::with_capacity(history.len() - cut + 1);
        new_history.push(Message::user(compaction_marker(&summary)));
        new_history.extend_from_slice(&history[cut..]);

        Ok(Some(CompactionResult {
            history: new_history,
            first_kept_index: cut,
            summary,
            tokens_before,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Usage;
    use async_trait::async_trait;
    use futures::stream;

    struct StubProvider {
        reply: String,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn stream(
            &self,
            _model: &str,
            _history: &[Message],
            _options: &ProviderOptions,
        ) -> Result<crate::provider::ProviderStream> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let message = Message::assistant(
                vec![ContentBlock::text(self.reply.clone())],
                "m",
                "stub",
                StopReason::Stop,
            );
            let _ = tx.send(Ok(message));
            Ok(crate::provider::ProviderStream {
                events: stream::empty().boxed(),
                result: rx,
            })
        }
    }

    fn assistant_with_usage(text: &str, total: u64) -> Message {
        Message::Assistant {
            content: vec![ContentBlock::text(text)],
            model: "m".into(),
            provider: "p".into(),
            usage: Usage {
                input_tokens: total,
                output_tokens: 0,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
            },
            stop_reason: StopReason::Stop,
            error: None,
            timestamp: 0,
        }
    }

    #[test]
    fn should_not_compact_when_disabled() {
        let config = CompactionConfig {
            enabled: false,
            context_window: 100,
            reserve_tokens: 10,
            keep_recent_tokens: 10,
        };
        let history = vec![Message::user("x".repeat(1000))];
        assert!(!CompactionEngine::should_compact(&history, &config));
    }

    #[test]
    fn should_compact_when_over_threshold() {
        let config = CompactionConfig {
            enabled: true,
            context_window: 100,
            reserve_tokens: 10,
            keep_recent_tokens: 10,
        };
        let history = vec![Message::user("x".repeat(1000))];
        assert!(CompactionEngine::should_compact(&history, &config));
    }

    #[test]
    fn estimate_tokens_uses_reported_usage_plus_trailing() {
        let history = vec![
            Message::user("hello"),
            assistant_with_usage("hi", 500),
            Message::user("more"),
        ];
        let estimated = CompactionEngine::estimate_tokens(&history);
        assert!(estimated >= 500);
    }

    #[test]
    fn aborted_assistant_messages_contribute_nothing() {
        let mut aborted = assistant_with_usage("partial", 0);
        if let Message::Assistant { stop_reason, usage, .. } = &mut aborted {
            *stop_reason = StopReason::Aborted;
            usage.input_tokens = 0;
        }
        let history = vec![Message::user("hello"), aborted];
        let with_abort = CompactionEngine::estimate_tokens(&history);

        let history_without = vec![Message::user("hello")];
        let without_abort = CompactionEngine::estimate_tokens(&history_without);
        assert_eq!(with_abort, without_abort);
    }

    #[test]
    fn cut_point_lands_on_user_boundary() {
        let history = vec![
            Message::user("one"),
            Message::assistant(vec![ContentBlock::text("a1")], "m", "p", StopReason::Stop),
            Message::user("two"),
            Message::assistant(vec![ContentBlock::text("a2")], "m", "p", StopReason::Stop),
            Message::user("three"),
        ];
        let cut = CompactionEngine::select_cut_point(&history, 1).unwrap();
        assert!(matches!(history[cut], Message::User { .. }));
    }

    #[test]
    fn short_history_skips_compaction() {
        let history = vec![Message::user("only one")];
        assert!(CompactionEngine::select_cut_point(&history, 10).is_none());
    }

    #[tokio::test]
    async fn maybe_compact_produces_marker_message_and_kept_tail() {
        let config = CompactionConfig {
            enabled: true,
            context_window: 50,
            reserve_tokens: 5,
            keep_recent_tokens: 5,
        };
        let history = vec![
            Message::user("x".repeat(200)),
            Message::assistant(vec![ContentBlock::text("y".repeat(200))], "m", "p", StopReason::Stop),
            Message::user("final question"),
        ];
        let provider = StubProvider { reply: "short summary".into() };

        let result = CompactionEngine::maybe_compact(&history, &config, &provider, "m", None)
            .await
            .unwrap()
            .expect("should compact");

        assert!(result.history[0].text().contains("short summary"));
        assert_eq!(result.summary, "short summary");
        assert!(result.history.len() < history.len() + 1);
    }
}
