//! Hooks system for intercepting and controlling agent execution
//!
//! This module provides a hooks system for monitoring and controlling agent
//! behavior at key lifecycle points. `PreToolUse`/`PostToolUse`/
//! `UserPromptSubmit` support multiple handlers (first non-`None` decision
//! wins); `ConfirmToolCall`, `TransformContext`, `ConvertToLlm` and
//! `OnMetrics` are single optional slots — the scheduler calls at most one
//! of each per turn.
//!
//! # Examples
//!
//! ```rust,no_run
//! use open_agent::{PreToolUseEvent, HookDecision};
//!
//! async fn approve_tool(event: PreToolUseEvent) -> Option<HookDecision> {
//!     if event.tool_name == "delete_file" {
//!         return Some(HookDecision {
//!             continue_execution: false,
//!             modified_input: None,
//!             modified_prompt: None,
//!             reason: Some("Dangerous operation blocked".to_string()),
//!         });
//!     }
//!     None // Continue normally
//! }
//! ```

use crate::message::{Message, ToolCall};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Event fired before tool execution
#[derive(Debug, Clone)]
pub struct PreToolUseEvent {
    /// Name of the tool about to be executed
    pub tool_name: String,
    /// Input parameters for the tool
    pub tool_input: Value,
    /// Unique identifier for this tool use
    pub tool_use_id: String,
    /// Snapshot of conversation history (read-only)
    pub history: Vec<Value>,
}

impl PreToolUseEvent {
    pub fn new(
        tool_name: String,
        tool_input: Value,
        tool_use_id: String,
        history: Vec<Value>,
    ) -> Self {
        Self {
            tool_name,
            tool_input,
            tool_use_id,
            history,
        }
    }
}

/// Event fired after tool execution
#[derive(Debug, Clone)]
pub struct PostToolUseEvent {
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Input parameters that were used
    pub tool_input: Value,
    /// Unique identifier for this tool use
    pub tool_use_id: String,
    /// Result returned by the tool (success or error)
    pub tool_result: Value,
    /// Snapshot of conversation history (read-only)
    pub history: Vec<Value>,
}

impl PostToolUseEvent {
    pub fn new(
        tool_name: String,
        tool_input: Value,
        tool_use_id: String,
        tool_result: Value,
        history: Vec<Value>,
    ) -> Self {
        Self {
            tool_name,
            tool_input,
            tool_use_id,
            tool_result,
            history,
        }
    }
}

/// Event fired before processing user input
#[derive(Debug, Clone)]
pub struct UserPromptSubmitEvent {
    /// The user's input prompt
    pub prompt: String,
    /// Snapshot of conversation history (read-only)
    pub history: Vec<Value>,
}

impl UserPromptSubmitEvent {
    pub fn new(prompt: String, history: Vec<Value>) -> Self {
        Self { prompt, history }
    }
}

/// Decision returned by hook handler to control execution
#[derive(Debug, Clone, Default)]
pub struct HookDecision {
    /// Whether to continue execution (default: true)
    pub continue_execution: bool,
    /// For PreToolUse - modified tool input (overrides original)
    pub modified_input: Option<Value>,
    /// For UserPromptSubmit - modified prompt (overrides original)
    pub modified_prompt: Option<String>,
    /// Optional explanation for logging/debugging
    pub reason: Option<String>,
}

impl HookDecision {
    /// Create a decision to continue execution normally
    pub fn continue_() -> Self {
        Self {
            continue_execution: true,
            modified_input: None,
            modified_prompt: None,
            reason: None,
        }
    }

    /// Create a decision to block execution
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            continue_execution: false,
            modified_input: None,
            modified_prompt: None,
            reason: Some(reason.into()),
        }
    }

    /// Create a decision to modify tool input
    pub fn modify_input(input: Value, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_input: Some(input),
            modified_prompt: None,
            reason: Some(reason.into()),
        }
    }

    /// Create a decision to modify prompt
    pub fn modify_prompt(prompt: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_input: None,
            modified_prompt: Some(prompt.into()),
            reason: Some(reason.into()),
        }
    }
}

/// Type alias for hook handler functions
///
/// Hook handlers are async functions that take an event and return an optional decision.
///
/// Returns:
/// - `None`: Continue normally with no modifications
/// - `Some(HookDecision)`: Control execution (continue/skip/modify)
///
/// Raising an error will abort execution entirely.
pub type PreToolUseHandler = Arc<
    dyn Fn(PreToolUseEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

pub type PostToolUseHandler = Arc<
    dyn Fn(PostToolUseEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

pub type UserPromptSubmitHandler = Arc<
    dyn Fn(UserPromptSubmitEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

/// Outcome of a `ConfirmToolCall` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    /// Dispatch the call normally.
    Allow,
    /// Skip dispatch; a synthetic tool-result error is appended instead.
    Deny,
    /// Skip dispatch and end the run entirely (surfaced as `Error::Aborted`).
    Abort,
}

/// Context passed to a `ConfirmToolCall` hook: the call about to be
/// dispatched plus a read-only snapshot of history up to this point.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub call: ToolCall,
    pub history: Vec<Message>,
}

impl ToolCallContext {
    pub fn new(call: ToolCall, history: Vec<Message>) -> Self {
        Self { call, history }
    }
}

/// Asks the host whether a pending tool call should be dispatched, denied,
/// or should abort the run. Unlike `PreToolUse`, this is the scheduler's own
/// confirmation gate rather than a tool-specific interception point, and
/// only one handler may be registered.
pub type ConfirmToolCallHandler =
    Arc<dyn Fn(ToolCallContext) -> Pin<Box<dyn Future<Output = ConfirmDecision> + Send>> + Send + Sync>;

/// Rewrites history before it is handed to the compaction engine or the
/// provider — e.g. redacting secrets, dropping stale tool results. Runs
/// synchronously since it is pure data transformation, not I/O.
pub type TransformContextHandler = Arc<dyn Fn(&[Message]) -> Vec<Message> + Send + Sync>;

/// Filters or converts history immediately before it is serialized for the
/// provider call. Defaults to passing history through unchanged, since the
/// message model is already closed to `User`/`Assistant`/`ToolResult`; hosts
/// use this to drop or compress entries per-provider (e.g. stripping
/// `Thinking` blocks for providers that reject them).
pub type ConvertToLlmHandler = Arc<dyn Fn(&[Message]) -> Vec<Message> + Send + Sync>;

/// Per-turn metrics snapshot handed to an `OnMetrics` hook after each turn
/// completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnMetrics {
    pub turn_index: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub tool_calls: u32,
}

/// Observes per-turn metrics. Synchronous and infallible: this is a
/// reporting sink (StatsD, Prometheus, a log line), not a control point.
pub type OnMetricsHandler = Arc<dyn Fn(&TurnMetrics) + Send + Sync>;

/// Pull-based hook the scheduler re-queries at defined points (the top of a
/// new turn, and after each sequential tool dispatch) for out-of-band
/// steering input. A `Some` return takes effect at the next between-tools
/// boundary: in sequential dispatch, calls not yet dispatched in the
/// current group are marked skipped rather than executed.
pub type SteeringHandler =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Option<Vec<Message>>> + Send>> + Send + Sync>;

/// Pull-based hook the scheduler queries once a turn produces no tool calls
/// and no steering is pending. A `Some` return re-opens the run with the
/// given messages instead of terminating.
pub type FollowUpHandler =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Option<Vec<Message>>> + Send>> + Send + Sync>;

/// Container for all hook types
#[derive(Clone, Default)]
pub struct Hooks {
    pub pre_tool_use: Vec<PreToolUseHandler>,
    pub post_tool_use: Vec<PostToolUseHandler>,
    pub user_prompt_submit: Vec<UserPromptSubmitHandler>,
    pub confirm_tool_call: Option<ConfirmToolCallHandler>,
    pub transform_context: Option<TransformContextHandler>,
    pub convert_to_llm: Option<ConvertToLlmHandler>,
    pub on_metrics: Option<OnMetricsHandler>,
    pub steering: Option<SteeringHandler>,
    pub follow_up: Option<FollowUpHandler>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a PreToolUse hook
    pub fn add_pre_tool_use<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PreToolUseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.pre_tool_use
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Add a PostToolUse hook
    pub fn add_post_tool_use<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PostToolUseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.post_tool_use
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Add a UserPromptSubmit hook
    pub fn add_user_prompt_submit<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(UserPromptSubmitEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.user_prompt_submit
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Execute PreToolUse hooks and return the first non-None decision
    pub async fn execute_pre_tool_use(&self, event: PreToolUseEvent) -> Option<HookDecision> {
        for handler in &self.pre_tool_use {
            if let Some(decision) = handler(event.clone()).await {
                return Some(decision);
            }
        }
        None
    }

    /// Execute PostToolUse hooks and return the first non-None decision
    pub async fn execute_post_tool_use(&self, event: PostToolUseEvent) -> Option<HookDecision> {
        for handler in &self.post_tool_use {
            if let Some(decision) = handler(event.clone()).await {
                return Some(decision);
            }
        }
        None
    }

    /// Execute UserPromptSubmit hooks and return the first non-None decision
    pub async fn execute_user_prompt_submit(
        &self,
        event: UserPromptSubmitEvent,
    ) -> Option<HookDecision> {
        for handler in &self.user_prompt_submit {
            if let Some(decision) = handler(event.clone()).await {
                return Some(decision);
            }
        }
        None
    }

    /// Set the ConfirmToolCall hook
    pub fn with_confirm_tool_call<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConfirmDecision> + Send + 'static,
    {
        self.confirm_tool_call = Some(Arc::new(move |ctx| Box::pin(handler(ctx))));
        self
    }

    /// Set the TransformContext hook
    pub fn with_transform_context<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[Message]) -> Vec<Message> + Send + Sync + 'static,
    {
        self.transform_context = Some(Arc::new(handler));
        self
    }

    /// Set the ConvertToLlm hook
    pub fn with_convert_to_llm<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[Message]) -> Vec<Message> + Send + Sync + 'static,
    {
        self.convert_to_llm = Some(Arc::new(handler));
        self
    }

    /// Set the OnMetrics hook
    pub fn with_on_metrics<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TurnMetrics) + Send + Sync + 'static,
    {
        self.on_metrics = Some(Arc::new(handler));
        self
    }

    /// Set the steering hook
    pub fn with_steering<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Vec<Message>>> + Send + 'static,
    {
        self.steering = Some(Arc::new(move || Box::pin(handler())));
        self
    }

    /// Set the follow-up hook
    pub fn with_follow_up<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Vec<Message>>> + Send + 'static,
    {
        self.follow_up = Some(Arc::new(move || Box::pin(handler())));
        self
    }

    /// Ask the ConfirmToolCall hook, if set, what to do with a pending call.
    /// Defaults to `Allow` when no hook is registered.
    pub async fn confirm_tool_call(&self, ctx: ToolCallContext) -> ConfirmDecision {
        match &self.confirm_tool_call {
            Some(handler) => handler(ctx).await,
            None => ConfirmDecision::Allow,
        }
    }

    /// Apply the TransformContext hook, if set; otherwise return `history`
    /// unchanged.
    pub fn transform_context(&self, history: &[Message]) -> Vec<Message> {
        match &self.transform_context {
            Some(handler) => handler(history),
            None => history.to_vec(),
        }
    }

    /// Apply the ConvertToLlm hook, if set; otherwise return `history`
    /// unchanged.
    pub fn convert_to_llm(&self, history: &[Message]) -> Vec<Message> {
        match &self.convert_to_llm {
            Some(handler) => handler(history),
            None => history.to_vec(),
        }
    }

    /// Invoke the OnMetrics hook, if set.
    pub fn report_metrics(&self, metrics: &TurnMetrics) {
        if let Some(handler) = &self.on_metrics {
            handler(metrics);
        }
    }

    /// Poll for pending steering input. Returns `None` when no hook is
    /// registered or the hook itself yields nothing this call.
    pub async fn poll_steering(&self) -> Option<Vec<Message>> {
        match &self.steering {
            Some(handler) => handler().await,
            None => None,
        }
    }

    /// Poll for a follow-up turn. Returns `None` when no hook is registered
    /// or the hook itself yields nothing this call.
    pub async fn poll_follow_up(&self) -> Option<Vec<Message>> {
        match &self.follow_up {
            Some(handler) => handler().await,
            None => None,
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field(
                "pre_tool_use",
                &format!("{} handlers", self.pre_tool_use.len()),
            )
            .field(
                "post_tool_use",
                &format!("{} handlers", self.post_tool_use.len()),
            )
            .field(
                "user_prompt_submit",
                &format!("{} handlers", self.user_prompt_submit.len()),
            )
            .field("confirm_tool_call", &self.confirm_tool_call.is_some())
            .field("transform_context", &self.transform_context.is_some())
            .field("convert_to_llm", &self.convert_to_llm.is_some())
            .field("on_metrics", &self.on_metrics.is_some())
            .field("steering", &self.steering.is_some())
            .field("follow_up", &self.follow_up.is_some())
            .finish()
    }
}

/// Hook event name constants
pub const HOOK_PRE_TOOL_USE: &str = "pre_tool_use";
pub const HOOK_POST_TOOL_USE: &str = "post_tool_use";
pub const HOOK_USER_PROMPT_SUBMIT: &str = "user_prompt_submit";
pub const HOOK_CONFIRM_TOOL_CALL: &str = "confirm_tool_call";
pub const HOOK_TRANSFORM_CONTEXT: &str = "transform_context";
pub const HOOK_CONVERT_TO_LLM: &str = "convert_to_llm";
pub const HOOK_ON_METRICS: &str = "on_metrics";
pub const HOOK_STEERING: &str = "steering";
pub const HOOK_FOLLOW_UP: &str = "follow_up";
