//! The provider abstraction: a uniform incremental event stream over
//! whatever wire protocol a given LLM server actually speaks.
//!
//! The scheduler never talks HTTP directly. It hands a `Provider` a model
//! name, a snapshot of history, and `ProviderOptions`, then drains the
//! returned event stream and calls `wait()` for the final assembled message.
//! `src/providers/openai_compat.rs` is the one concrete adapter this crate
//! ships; hosts can implement `Provider` for anything else speaking a
//! different wire format.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{ContentBlock, Message, ToolDefinition};

/// Reasoning effort hint passed to providers that support extended thinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Off,
    Minimal,
    Low,
    #[default]
    Medium,
    High,
    Xhigh,
}

/// Cache-retention hint passed to providers that support prompt caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheRetention {
    #[default]
    None,
    Short,
    Long,
}

/// Per-call options the scheduler passes to every `Provider::stream` call.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub api_key: Option<String>,
    pub reasoning_effort: ReasoningEffort,
    pub cache_retention: CacheRetention,
    /// Optional reasoning token budget per effort level, for providers that
    /// let callers cap thinking-token spend independently of output tokens.
    pub reasoning_token_budget: Option<u32>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: None,
            temperature: None,
            api_key: None,
            reasoning_effort: ReasoningEffort::default(),
            cache_retention: CacheRetention::default(),
            reasoning_token_budget: None,
            system_prompt: None,
            tools: Vec::new(),
        }
    }
}

/// A partial, in-progress assistant message as the provider assembles it.
/// Event payloads carry a snapshot of this plus (where applicable) the
/// incremental delta since the previous event.
#[derive(Debug, Clone, Default)]
pub struct PartialMessage {
    pub content: Vec<ContentBlock>,
}

/// One increment of a provider's streamed response. Every event that carries
/// a "latest partial" field copies the accumulated `PartialMessage` so far;
/// `delta` (where present) is just the newly-arrived text/argument fragment.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Start { partial: PartialMessage },
    TextStart { partial: PartialMessage },
    TextDelta { partial: PartialMessage, delta: String },
    TextEnd { partial: PartialMessage },
    ThinkingStart { partial: PartialMessage },
    ThinkingDelta { partial: PartialMessage, delta: String },
    ThinkingEnd { partial: PartialMessage },
    ToolCallStart { partial: PartialMessage, name: String, call_id: String },
    ToolCallDelta { partial: PartialMessage, delta: String },
    ToolCallEnd { partial: PartialMessage },
    Done { partial: PartialMessage },
    Error { message: String },
}

/// One open stream: an event channel plus a `wait()` future resolving to the
/// final assistant message. Implementors must keep both consumable
/// concurrently, or guarantee the stream fully drains before `wait()`
/// resolves (the `openai_compat` adapter does the latter — it parses the
/// whole SSE body before the stream is considered exhausted).
pub struct ProviderStream {
    pub events: BoxStream<'static, StreamEvent>,
    pub result: tokio::sync::oneshot::Receiver<Result<Message>>,
}

/// A uniform streaming adapter over one LLM wire protocol.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier recorded on every assistant message (`Message::Assistant::provider`).
    fn name(&self) -> &str;

    /// Opens a stream for one turn. `history` is a snapshot already filtered
    /// by `ConvertToLLM`; the provider owns turning it into its own wire
    /// format. Must always close the event stream, even on cancellation, and
    /// `result` must always resolve (possibly with an error) once the stream
    /// is drained.
    async fn stream(
        &self,
        model: &str,
        history: &[Message],
        options: &ProviderOptions,
    ) -> Result<ProviderStream>;
}

/// Phrases providers commonly use to report that the request exceeded the
/// model's context window. Matched case-insensitively against the assistant
/// message's error text.
const OVERFLOW_PHRASES: &[&str] = &[
    "context length",
    "context_length_exceeded",
    "maximum context length",
    "context window",
    "too many tokens",
    "input exceeded context window",
    "prompt is too long",
];

/// Checks whether an assistant message represents a context-window overflow:
/// phrase matching, no-body 400/413 shapes, and silent overflow (usage
/// exceeding a known context window). Exposed for host-level retry logic;
/// the scheduler itself does not consume this.
pub fn classify_overflow(message: &Message, known_context_window: Option<u64>) -> bool {
    if let Message::Assistant { error, usage, .. } = message {
        if let Some(err) = error {
            let lower = err.to_lowercase();
            if OVERFLOW_PHRASES.iter().any(|p| lower.contains(p)) {
                return true;
            }
            if lower.contains("400") || lower.contains("413") {
                if lower.contains("token") || lower.contains("context") {
                    return true;
                }
            }
        }
        if let Some(window) = known_context_window {
            if usage.input_tokens + usage.cache_read_tokens > window {
                return true;
            }
        }
    }
    false
}
