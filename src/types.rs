//! Agent configuration surface.
//!
//! Model/provider connection settings plus the scheduler knobs
//! (`max_turns`, `max_retries`, `max_tool_concurrency`, ...) and the nested
//! compaction configuration. The data model itself (messages, content
//! blocks, tool definitions) lives in `message.rs`; this module only holds
//! the builder-validated settings an `Agent` is constructed with.
//!
//! YAML loading, environment expansion, and hot-reload polling are external
//! collaborators — this module only models the in-memory surface they
//! would populate.

use crate::Error;
use crate::hooks::Hooks;
use crate::tools::Tool;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// NEWTYPE WRAPPERS FOR COMPILE-TIME TYPE SAFETY
// ============================================================================

/// Validated model name with compile-time type safety.
///
/// # Examples
///
/// ```
/// use open_agent::ModelName;
///
/// let model = ModelName::new("qwen2.5-32b-instruct").unwrap();
/// assert_eq!(model.as_str(), "qwen2.5-32b-instruct");
/// assert!(ModelName::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_input(
                "Model name cannot be empty or whitespace",
            ));
        }
        Ok(ModelName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated base URL with compile-time type safety.
///
/// # Examples
///
/// ```
/// use open_agent::BaseUrl;
///
/// let url = BaseUrl::new("http://localhost:1234/v1").unwrap();
/// assert_eq!(url.as_str(), "http://localhost:1234/v1");
/// assert!(BaseUrl::new("localhost:1234").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseUrl(String);

impl BaseUrl {
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let url = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_input("base_url cannot be empty"));
        }
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(Error::invalid_input(
                "base_url must start with http:// or https://",
            ));
        }
        Ok(BaseUrl(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated sampling temperature (0.0-2.0 inclusive).
///
/// ```
/// use open_agent::Temperature;
///
/// assert_eq!(Temperature::new(0.7).unwrap().value(), 0.7);
/// assert!(Temperature::new(2.1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f32);

impl Temperature {
    pub fn new(temp: f32) -> crate::Result<Self> {
        if !(0.0..=2.0).contains(&temp) {
            return Err(Error::invalid_input(
                "temperature must be between 0.0 and 2.0",
            ));
        }
        Ok(Temperature(temp))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// COMPACTION CONFIGURATION
// ============================================================================

/// Configuration for the context-compaction engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionConfig {
    /// Whether the scheduler invokes the compaction engine before each turn.
    pub enabled: bool,
    /// The model's total context window, in tokens.
    pub context_window: u64,
    /// Tokens reserved for the upcoming response plus headroom; compaction
    /// triggers when `estimated > context_window - reserve_tokens`.
    pub reserve_tokens: u64,
    /// Minimum tokens of the tail the cut-point search must preserve before
    /// advancing forward to the next user-message boundary.
    pub keep_recent_tokens: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            context_window: 32_000,
            reserve_tokens: 4_000,
            keep_recent_tokens: 8_000,
        }
    }
}

// ============================================================================
// AGENT CONFIGURATION
// ============================================================================

/// Configuration for an `Agent` (scheduler) instance.
///
/// Constructed via [`AgentOptions::builder()`]. Organized into:
///
/// - **Connection**: `model`, `base_url`, `api_key`, `temperature`, `max_tokens`
/// - **System prompt**: `system_prompt`
/// - **Scheduler limits** (spec §4.1/§6): `max_turns`, `max_retries`,
///   `retry_base_delay`, `max_tool_concurrency`, `tool_timeout`, `max_cost_usd`
/// - **Compaction**: `compaction`
/// - **Tools**: `tools`, registered into the agent's `ToolRegistry` at construction
/// - **Hooks**: `hooks`
#[derive(Clone)]
pub struct AgentOptions {
    system_prompt: String,
    model: String,
    base_url: String,
    api_key: String,

    /// Turn cap; 0 means unlimited (spec §4.1 step 1).
    max_turns: u32,
    max_tokens: Option<u32>,
    temperature: f32,
    /// HTTP request timeout, applied per provider call.
    timeout: u64,

    /// Cumulative USD budget across the run; `None` means unlimited.
    max_cost_usd: Option<f64>,
    /// Provider-call retry budget (exponential backoff, spec §4.1).
    max_retries: u32,
    retry_base_delay: Duration,
    /// Tool dispatch concurrency; `<= 1` means sequential (spec §4.1).
    max_tool_concurrency: usize,
    /// Per-call tool deadline; `None`/zero means no timeout.
    tool_timeout: Option<Duration>,

    compaction: CompactionConfig,

    tools: Vec<Arc<Tool>>,
    hooks: Hooks,
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("system_prompt", &self.system_prompt)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("max_turns", &self.max_turns)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("max_cost_usd", &self.max_cost_usd)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("max_tool_concurrency", &self.max_tool_concurrency)
            .field("tool_timeout", &self.tool_timeout)
            .field("compaction", &self.compaction)
            .field("tools", &format!("{} tools", self.tools.len()))
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            model: String::new(),
            base_url: String::new(),
            api_key: "not-needed".to_string(),
            max_turns: 0,
            max_tokens: Some(4096),
            temperature: 0.7,
            timeout: 60,
            max_cost_usd: None,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            max_tool_concurrency: 1,
            tool_timeout: None,
            compaction: CompactionConfig::default(),
            tools: Vec::new(),
            hooks: Hooks::new(),
        }
    }
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn max_cost_usd(&self) -> Option<f64> {
        self.max_cost_usd
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    pub fn max_tool_concurrency(&self) -> usize {
        self.max_tool_concurrency
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout
    }

    pub fn compaction(&self) -> CompactionConfig {
        self.compaction
    }

    pub fn tools(&self) -> &[Arc<Tool>] {
        &self.tools
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

/// Builder for [`AgentOptions`]. `model` and `base_url` are required; every
/// other field has a sensible default applied in [`build()`](AgentOptionsBuilder::build).
#[derive(Default)]
pub struct AgentOptionsBuilder {
    system_prompt: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    max_turns: Option<u32>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout: Option<u64>,
    max_cost_usd: Option<f64>,
    max_retries: Option<u32>,
    retry_base_delay: Option<Duration>,
    max_tool_concurrency: Option<usize>,
    tool_timeout: Option<Duration>,
    compaction: Option<CompactionConfig>,
    tools: Vec<Arc<Tool>>,
    hooks: Hooks,
}

impl std::fmt::Debug for AgentOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptionsBuilder")
            .field("system_prompt", &self.system_prompt)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("tools", &format!("{} tools", self.tools.len()))
            .finish()
    }
}

impl AgentOptionsBuilder {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// 0 means unlimited (spec §4.1 step 1).
    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Cumulative USD budget across the run (spec §4.1 step 1, §8 "MaxCostUSD").
    pub fn max_cost_usd(mut self, budget: f64) -> Self {
        self.max_cost_usd = Some(budget);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    /// `<= 1` dispatches tool calls sequentially; `> 1` uses a bounded worker
    /// pool of this size (spec §4.1 "Tool dispatch ordering").
    pub fn max_tool_concurrency(mut self, concurrency: usize) -> Self {
        self.max_tool_concurrency = Some(concurrency);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn compaction(mut self, config: CompactionConfig) -> Self {
        self.compaction = Some(config);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools.into_iter().map(Arc::new));
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validates required fields and applies defaults for everything else.
    pub fn build(self) -> crate::Result<AgentOptions> {
        let model = self
            .model
            .ok_or_else(|| crate::Error::config("model is required"))?;
        let base_url = self
            .base_url
            .ok_or_else(|| crate::Error::config("base_url is required"))?;

        if model.trim().is_empty() {
            return Err(crate::Error::invalid_input(
                "model cannot be empty or whitespace",
            ));
        }
        if base_url.trim().is_empty() {
            return Err(crate::Error::invalid_input("base_url cannot be empty"));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(crate::Error::invalid_input(
                "base_url must start with http:// or https://",
            ));
        }

        let temperature = self.temperature.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(crate::Error::invalid_input(
                "temperature must be between 0.0 and 2.0",
            ));
        }

        let max_tokens = self.max_tokens.or(Some(4096));
        if let Some(tokens) = max_tokens {
            if tokens == 0 {
                return Err(crate::Error::invalid_input(
                    "max_tokens must be greater than 0",
                ));
            }
        }

        Ok(AgentOptions {
            system_prompt: self.system_prompt.unwrap_or_default(),
            model,
            base_url,
            api_key: self.api_key.unwrap_or_else(|| "not-needed".to_string()),
            max_turns: self.max_turns.unwrap_or(0),
            max_tokens,
            temperature,
            timeout: self.timeout.unwrap_or(60),
            max_cost_usd: self.max_cost_usd,
            max_retries: self.max_retries.unwrap_or(3),
            retry_base_delay: self.retry_base_delay.unwrap_or(Duration::from_secs(1)),
            max_tool_concurrency: self.max_tool_concurrency.unwrap_or(1),
            tool_timeout: self.tool_timeout,
            compaction: self.compaction.unwrap_or_default(),
            tools: self.tools,
            hooks: self.hooks,
        })
    }
}
