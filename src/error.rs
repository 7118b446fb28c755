//! Error types for the Open Agent SDK, including the scheduler-level error
//! taxonomy used to classify retry/abort/report behavior (see
//! `retry::classify` and `scheduler`).

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// API error from the model server
    #[error("API error: {0}")]
    Api(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),

    /// A provider error the scheduler's retry classifier judged transient
    /// (rate limits, 5xx, timeouts, connection resets) — eligible for
    /// backoff-and-retry up to `max_retries`.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// A provider error the classifier judged permanent — surfaced as a
    /// turn-ending error without retrying.
    #[error("permanent provider error: {0}")]
    PermanentProvider(String),

    /// The run was cancelled via `Agent::abort()`.
    #[error("run aborted")]
    Aborted,

    /// The provider reported (or usage counters imply) a context-window
    /// overflow that compaction did not resolve.
    #[error("context window overflow: {0}")]
    Overflow(String),

    /// A hook denied a tool call before it was dispatched.
    #[error("tool call denied: {0}")]
    ToolDenied(String),

    /// The model called a tool name not present in the registry.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments failed schema validation even after the coercion pass.
    #[error("invalid arguments for tool '{tool}': {message}")]
    ToolInvalidArgs {
        tool: String,
        message: String,
        arguments: serde_json::Value,
    },

    /// A tool handler panicked; the panic payload (stringified) is recorded
    /// and surfaced as a tool-result error rather than propagated.
    #[error("tool '{tool}' panicked: {message}")]
    ToolPanic { tool: String, message: String },

    /// A tool handler did not complete within its configured timeout.
    #[error("tool '{tool}' timed out after {duration_ms}ms")]
    ToolTimeout { tool: String, duration_ms: u64 },

    /// The subprocess plugin protocol was violated (malformed line, missing
    /// response, process exited mid-call).
    #[error("plugin protocol error: {0}")]
    PluginProtocol(String),

    /// `Agent::prompt`/`prompt_messages` was called while a run was already
    /// in progress (scheduler state was not `Idle`/`TurnBetween`).
    #[error("agent is already running a turn")]
    AlreadyRunning,

    /// Session log read/write/fork/parse failure.
    #[error("session error: {0}")]
    Session(String),

    /// Compaction trigger, cut-point selection, or summary synthesis failed.
    #[error("compaction error: {0}")]
    Compaction(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    pub fn transient_provider(msg: impl Into<String>) -> Self {
        Error::TransientProvider(msg.into())
    }

    pub fn permanent_provider(msg: impl Into<String>) -> Self {
        Error::PermanentProvider(msg.into())
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        Error::Overflow(msg.into())
    }

    pub fn tool_denied(msg: impl Into<String>) -> Self {
        Error::ToolDenied(msg.into())
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Error::ToolNotFound(name.into())
    }

    pub fn tool_invalid_args(
        tool: impl Into<String>,
        message: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Error::ToolInvalidArgs {
            tool: tool.into(),
            message: message.into(),
            arguments,
        }
    }

    pub fn tool_panic(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolPanic {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn tool_timeout(tool: impl Into<String>, duration_ms: u64) -> Self {
        Error::ToolTimeout {
            tool: tool.into(),
            duration_ms,
        }
    }

    pub fn plugin_protocol(msg: impl Into<String>) -> Self {
        Error::PluginProtocol(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Error::Session(msg.into())
    }

    pub fn compaction(msg: impl Into<String>) -> Self {
        Error::Compaction(msg.into())
    }

    /// Whether this error represents a condition the scheduler should retry
    /// with backoff rather than end the turn immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientProvider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model");
    }

    #[test]
    fn test_error_api() {
        let err = Error::api("500 Internal Server Error");
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "API error: 500 Internal Server Error");
    }

    #[test]
    fn test_error_stream() {
        let err = Error::stream("Connection lost");
        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(err.to_string(), "Streaming error: Connection lost");
    }

    #[test]
    fn test_error_tool() {
        let err = Error::tool("Tool not found");
        assert!(matches!(err, Error::Tool(_)));
        assert_eq!(err.to_string(), "Tool execution error: Tool not found");
    }

    #[test]
    fn test_error_invalid_input() {
        let err = Error::invalid_input("Missing parameter");
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid input: Missing parameter");
    }

    #[test]
    fn test_error_timeout() {
        let err = Error::timeout();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.to_string(), "Request timeout");
    }

    #[test]
    fn test_error_other() {
        let err = Error::other("Something went wrong");
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "Error: Something went wrong");
    }

    #[test]
    fn test_error_from_reqwest() {
        // Test that reqwest::Error can be converted
        // This is mostly for compile-time checking
        fn _test_conversion(_e: reqwest::Error) -> Error {
            // This function just needs to compile
            Error::Http(_e)
        }
    }

    #[test]
    fn test_error_from_serde_json() {
        // Test that serde_json::Error can be converted
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_error_tool_invalid_args() {
        let err = Error::tool_invalid_args("search", "missing required parameter 'query'", serde_json::json!({}));
        assert!(matches!(err, Error::ToolInvalidArgs { .. }));
        assert!(err.to_string().contains("search"));
    }

    #[test]
    fn test_error_is_transient() {
        assert!(Error::transient_provider("503").is_transient());
        assert!(!Error::permanent_provider("400").is_transient());
        assert!(!Error::Aborted.is_transient());
    }

    #[test]
    fn test_error_tool_timeout_display() {
        let err = Error::tool_timeout("search", 5000);
        assert_eq!(err.to_string(), "tool 'search' timed out after 5000ms");
    }

    #[test]
    fn test_result_type_alias() {
        // Test that our Result type alias works correctly
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }

        fn _returns_error() -> Result<i32> {
            Err(Error::timeout())
        }
    }
}
