//! # Open Agent SDK - Rust Implementation
//!
//! An embeddable agent runtime for local, OpenAI-compatible LLM servers: a
//! turn-by-turn scheduler, a tool registry with subprocess plugin support, a
//! context-compaction engine, and an append-only session log with fork
//! semantics, all driven through a uniform provider event stream.
//!
//! ## Key Features
//!
//! - **Provider-agnostic streaming**: one `Provider` trait turns any wire
//!   protocol into a uniform `StreamEvent` sequence (see [`provider`]).
//! - **Tool calling**: JSON-Schema-validated tools, in-process or as
//!   subprocess plugins (see [`tools`], [`plugin`]).
//! - **Lifecycle hooks**: confirm/deny tool calls, transform context,
//!   steer or continue a run, observe per-turn metrics (see [`hooks`]).
//! - **Context compaction**: token-budget-triggered summarization that
//!   keeps a run inside its context window (see [`compaction`]).
//! - **Session log**: append-only JSONL with fork semantics (see [`session`]).
//! - **Sub-agents**: run an agent to completion for its final text, or
//!   expose it as a tool of another agent (see [`subagent`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use open_agent::{Agent, AgentOptions, OpenAiCompatProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .system_prompt("You are a helpful assistant")
//!         .model("qwen2.5-32b-instruct")
//!         .base_url("http://localhost:1234/v1")
//!         .build()?;
//!
//!     let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
//!     let agent = Agent::new(options, provider)?;
//!
//!     agent.prompt("What's the capital of France?").await?;
//!     for message in agent.history().await {
//!         println!("{:?}", message);
//!     }
//!     Ok(())
//! }
//! ```

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Compaction trigger, cut-point selection, and synthetic-summary synthesis.
pub mod compaction;

/// Provider configuration helpers for LM Studio, Ollama, llama.cpp, and vLLM.
pub mod config;

/// Token estimation and history-truncation utilities used outside the
/// scheduler's own (compaction-integrated) budget tracking.
pub mod context;

/// Error types and conversions used across all public APIs.
pub mod error;

/// The scheduler's event bus: `Event`, `EventBus`, and subscription handles.
pub mod events;

/// Lifecycle hooks: tool-call confirmation, context transforms, steering,
/// follow-ups, and per-turn metrics.
pub mod hooks;

/// The closed `Message`/`ContentBlock` model every other module speaks.
pub mod message;

/// Subprocess plugin transport: wraps an external process as a `Tool`.
pub mod plugin;

/// The `Provider` trait and the uniform `StreamEvent` stream it produces.
pub mod provider;

/// Concrete provider adapters. Currently just the OpenAI-compatible one
/// every local server in this SDK's target list speaks.
pub mod providers;

/// Exponential-backoff retry helpers and transient/permanent error
/// classification.
pub mod retry;

/// The loop scheduler: `Agent`, the turn-by-turn driver over a `Provider`.
pub mod scheduler;

/// Append-only JSONL session log with entry-id chaining and fork semantics.
pub mod session;

/// Sub-agent wrapper: direct invocation for final text, or exposure as a
/// tool of a parent agent.
pub mod subagent;

/// Tool definitions, schema normalization, the registry, and argument
/// validation/coercion.
pub mod tools;

/// Agent configuration (`AgentOptions`) and the small validated value types
/// (`ModelName`, `BaseUrl`, `Temperature`, `CompactionConfig`) it's built from.
pub mod types;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

pub use compaction::{CompactionEngine, CompactionResult};
pub use config::{get_base_url, get_model, Provider as ServerProvider};
pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};
pub use error::{Error, Result};
pub use events::{AgentStateSnapshot, Event, EventBus, Unsubscribe};
pub use hooks::{
    ConfirmDecision, HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, ToolCallContext,
    TurnMetrics, UserPromptSubmitEvent, HOOK_CONFIRM_TOOL_CALL, HOOK_CONVERT_TO_LLM,
    HOOK_FOLLOW_UP, HOOK_ON_METRICS, HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_STEERING,
    HOOK_TRANSFORM_CONTEXT, HOOK_USER_PROMPT_SUBMIT,
};
pub use message::{ContentBlock, Message, StopReason, ToolCall, ToolDefinition, Usage};
pub use plugin::Plugin;
pub use provider::{
    CacheRetention, PartialMessage, Provider, ProviderOptions, ProviderStream, ReasoningEffort,
    StreamEvent,
};
pub use providers::OpenAiCompatProvider;
pub use scheduler::{Agent, AgentState};
pub use session::{Session, SessionSummary};
pub use tools::{tool, OnUpdate, Tool, ToolBuilder, ToolOutput, ToolRegistry};
pub use types::{AgentOptions, AgentOptionsBuilder, BaseUrl, CompactionConfig, ModelName, Temperature};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types and functions. `use open_agent::prelude::*;`
/// covers a typical host integration: building an agent, registering tools,
/// and reacting to its event stream.
pub mod prelude {
    pub use crate::{
        tool, Agent, AgentOptions, AgentOptionsBuilder, AgentStateSnapshot, ContentBlock, Error,
        Event, HookDecision, Hooks, Message, OpenAiCompatProvider, Provider, Result, Session,
        Tool, ToolOutput, ToolRegistry,
    };
}
