//! # Tool System
//!
//! Tool definitions, schema normalization, execution, the name-indexed
//! registry, and the argument validation/coercion pass run before dispatch.
//!
//! ## Architecture Overview
//!
//! 1. **Tool Definition** - [`Tool`] pairs metadata (name, description,
//!    schema) with an async handler.
//! 2. **Schema Flexibility** - simple type notation, extended per-property
//!    notation, or full JSON Schema, all normalized by
//!    [`convert_schema_to_openai`].
//! 3. **Registry** - [`ToolRegistry`] is the name-indexed table the
//!    scheduler dispatches against; `register` fails loudly on a duplicate
//!    name, `register_or_replace` doesn't.
//! 4. **Validation** - [`validate_and_coerce`] checks arguments against a
//!    tool's schema before execution and attempts a narrow set of coercions
//!    (numeric string → number, number → string, "true"/"false" → bool) if
//!    the first pass fails, matching what a human pasting loosely-typed JSON
//!    would expect to just work.
//!
//! ## Tool Lifecycle
//!
//! ```text
//! 1. Definition:    Create tool with name, description, schema, and handler
//! 2. Registration:  Add tool to a ToolRegistry
//! 3. Invocation:    LLM emits a tool call
//! 4. Validation:    validate_and_coerce() checks/repairs arguments
//! 5. Execution:     Handler processes arguments, may report progress
//! 6. Response:      ToolOutput becomes a Message::ToolResult
//! ```

use crate::message::ContentBlock;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// What a tool handler hands back: content blocks appended to the
/// conversation plus an opaque `details` payload that is logged and
/// inspectable but never shown to the model (raw stdout, timing, a diff).
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    pub details: Option<Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<Value> for ToolOutput {
    /// Simple handlers return a bare JSON value; it becomes the tool
    /// result's text verbatim if it's already a string, or its compact JSON
    /// rendering otherwise. The original value is kept as `details`.
    fn from(value: Value) -> Self {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ToolOutput {
            content: vec![ContentBlock::text(text)],
            details: Some(value),
        }
    }
}

/// Synchronous progress callback a handler may invoke any number of times
/// before returning its final `ToolOutput`. The scheduler wires this to
/// broadcast `ToolUpdate` events as the handler runs.
pub type OnUpdate = Arc<dyn Fn(ToolOutput) + Send + Sync>;

/// Type alias for tool handler functions.
///
/// ```text
/// Arc<                                         // Thread-safe reference counting
///   dyn Fn(Value, Option<OnUpdate>)             // Arguments + optional progress callback
///     -> Pin<Box<
///       dyn Future<Output = Result<ToolOutput>>
///         + Send>>
///     + Send + Sync>
/// ```
///
/// `Arc` lets the same handler be shared between a `Tool` value stored in a
/// registry and any clones taken for concurrent dispatch. `Pin<Box<dyn
/// Future>>` type-erases the concrete future each handler closure produces
/// so tools with different handler bodies can live in one collection.
pub type ToolHandler = Arc<
    dyn Fn(Value, Option<OnUpdate>) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>>
        + Send
        + Sync,
>;

/// Tool definition: identity, schema, and handler. Cloning only clones two
/// `String`s and bumps an `Arc` refcount — cheap enough to clone freely when
/// handing a snapshot of tools to a provider call.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
}

impl Tool {
    /// Full-control constructor. The handler receives the (validated/coerced)
    /// arguments and an optional progress callback, and returns a
    /// `ToolOutput` — content blocks plus an opaque details payload.
    ///
    /// `input_schema` accepts three shapes, normalized by
    /// [`convert_schema_to_openai`]:
    /// - simple notation: `{"location": "string"}` (all required)
    /// - extended notation: `{"limit": {"type": "integer", "optional": true}}`
    /// - full JSON Schema: passed through unchanged
    pub fn with_updates<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, Option<OnUpdate>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: convert_schema_to_openai(input_schema),
            handler: Arc::new(move |args, on_update| Box::pin(handler(args, on_update))),
        }
    }

    /// Convenience constructor for handlers that don't report progress and
    /// want to return a plain JSON value, wrapped into a single text content
    /// block via [`ToolOutput::from`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use open_agent::Tool;
    /// use serde_json::json;
    ///
    /// let calculator = Tool::new(
    ///     "multiply",
    ///     "Multiply two numbers together",
    ///     json!({"a": "number", "b": "number"}),
    ///     |args| async move {
    ///         let a = args["a"].as_f64().unwrap_or(1.0);
    ///         let b = args["b"].as_f64().unwrap_or(1.0);
    ///         Ok(json!({"result": a * b}))
    ///     },
    /// );
    /// ```
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::with_updates(name, description, input_schema, move |args, _on_update| {
            let fut = handler(args);
            async move { fut.await.map(ToolOutput::from) }
        })
    }

    pub async fn execute(&self, arguments: Value, on_update: Option<OnUpdate>) -> Result<ToolOutput> {
        (self.handler)(arguments, on_update).await
    }

    /// Converts to OpenAI's function-calling tool format:
    /// `{"type": "function", "function": {"name", "description", "parameters"}}`.
    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema
            }
        })
    }

    /// The provider-agnostic shape of this tool, for `ProviderOptions::tools`.
    pub fn definition(&self) -> crate::message::ToolDefinition {
        crate::message::ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// The handler field is omitted: `Arc<dyn Fn...>` has no useful debug
/// representation, and the metadata fields are what matter for diagnostics.
impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Normalizes simple/extended schema notation to full JSON Schema; a schema
/// that already has `"type"` and `"properties"` passes through unchanged.
///
/// Per-property optionality follows this priority: explicit
/// `"required": true/false` wins, then `"optional": true`, then presence of
/// a `"default"` value implies optional, otherwise the property is required.
/// The `"optional"`/`"required"` meta-keys are stripped before the property
/// lands in the output schema — they aren't standard JSON Schema.
fn convert_schema_to_openai(schema: Value) -> Value {
    if schema.is_object() {
        let obj = schema
            .as_object()
            .expect("BUG: is_object() returned true but as_object() returned None");
        if obj.contains_key("type") && obj.contains_key("properties") {
            return schema;
        }

        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (param_name, param_type) in obj {
            if let Some(type_str) = param_type.as_str() {
                properties.insert(param_name.clone(), type_to_json_schema(type_str));
                required.push(param_name.clone());
            } else if param_type.is_object() {
                let mut prop = param_type.clone();
                let prop_obj = prop
                    .as_object_mut()
                    .expect("BUG: is_object() returned true but as_object_mut() returned None");

                let is_optional = prop_obj
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop_obj.remove("required").and_then(|v| v.as_bool());
                let has_default = prop_obj.contains_key("default");

                properties.insert(param_name.clone(), prop);

                if let Some(true) = is_required {
                    required.push(param_name.clone());
                } else if is_optional || is_required == Some(false) {
                    // explicitly optional
                } else if !has_default {
                    required.push(param_name.clone());
                }
            }
        }

        return serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required
        });
    }

    serde_json::json!({"type": "object", "properties": {}, "required": []})
}

/// Maps friendly/Rust-like type names to JSON Schema primitive types.
/// Unknown strings default to `"string"` rather than failing tool
/// construction over a typo.
fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };
    serde_json::json!({ "type": json_type })
}

/// Fluent builder for [`Tool`]. See [`tool()`] for the typical entry point.
/// Calling `.param()` after `.schema()` set a non-object value resets the
/// schema to an empty object first; mixing `.schema()` and `.param()` is
/// supported but generally pick one.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        let obj = self
            .schema
            .as_object_mut()
            .expect("BUG: schema should be an object after initialization");
        obj.insert(name.to_string(), Value::String(type_str.to_string()));
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }

    /// Like `build`, but for handlers that want progress reporting and full
    /// control over the returned content blocks.
    pub fn build_with_updates<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value, Option<OnUpdate>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Tool::with_updates(self.name, self.description, self.schema, handler)
    }
}

/// Create a tool using the builder pattern.
///
/// ```rust,no_run
/// use open_agent::tool;
/// use serde_json::json;
///
/// let add_tool = tool("add", "Add two numbers")
///     .param("a", "number")
///     .param("b", "number")
///     .build(|args| async move {
///         let a = args["a"].as_f64().unwrap_or(0.0);
///         let b = args["b"].as_f64().unwrap_or(0.0);
///         Ok(json!({"result": a + b}))
///     });
/// ```
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

// ---------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------

/// Name-indexed tool table, safe for concurrent reads and exclusive writes.
/// The scheduler holds one per agent and looks tools up by name at dispatch
/// time.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, failing if a tool with the same name is already
    /// present.
    pub fn register(&self, tool: Tool) -> Result<()> {
        let mut guard = self.tools.write().expect("tool registry lock poisoned");
        if guard.contains_key(tool.name()) {
            return Err(crate::error::Error::config(format!(
                "tool '{}' is already registered",
                tool.name()
            )));
        }
        guard.insert(tool.name().to_string(), Arc::new(tool));
        Ok(())
    }

    /// Registers a tool, replacing any existing tool with the same name.
    pub fn register_or_replace(&self, tool: Tool) {
        let mut guard = self.tools.write().expect("tool registry lock poisoned");
        guard.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.write().expect("tool registry lock poisoned").remove(name)
    }

    pub fn all(&self) -> Vec<Arc<Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Provider-agnostic definitions for every registered tool, in the order
    /// returned by the underlying map (unordered — callers needing a stable
    /// order should sort by name).
    pub fn definitions(&self) -> Vec<crate::message::ToolDefinition> {
        self.all().iter().map(|t| t.definition()).collect()
    }
}

// ---------------------------------------------------------------------
// Argument validation and coercion
// ---------------------------------------------------------------------

fn schema_type_matches(declared: &str, value: &Value) -> bool {
    match declared {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// Checks `args` against the schema's top-level `required`/typed
/// `properties`. Returns the first mismatch found, or `None` if the schema
/// itself isn't a recognizable object schema (fail-open) or everything
/// matches.
fn validate(schema: &Value, args: &Value) -> Option<String> {
    let obj = schema.as_object()?;
    let properties = obj.get("properties")?.as_object()?;
    let required: Vec<&str> = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let args_obj = args.as_object();

    for name in &required {
        if args_obj.and_then(|o| o.get(*name)).is_none() {
            return Some(format!("missing required parameter '{name}'"));
        }
    }

    if let Some(args_obj) = args_obj {
        for (name, value) in args_obj {
            if let Some(prop_schema) = properties.get(name) {
                if let Some(declared) = prop_schema.get("type").and_then(|t| t.as_str()) {
                    if !schema_type_matches(declared, value) {
                        return Some(format!(
                            "parameter '{name}' expected type '{declared}', got {value}"
                        ));
                    }
                }
            }
        }
    }

    None
}

/// Applies the narrow top-level coercions dispatch allows: numeric strings
/// to numbers, numbers to strings, and "true"/"false" strings (any case) to
/// booleans. Anything that doesn't match one of those shapes is left as-is
/// for the second validation pass to reject.
fn coerce(schema: &Value, args: &Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return args.clone();
    };
    let Some(args_obj) = args.as_object() else {
        return args.clone();
    };

    let mut out = args_obj.clone();
    for (name, value) in args_obj {
        let Some(declared) = properties
            .get(name)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };

        let coerced = match (declared, value) {
            ("number", Value::String(s)) => s.parse::<f64>().ok().and_then(|n| {
                serde_json::Number::from_f64(n).map(Value::Number)
            }),
            ("integer", Value::String(s)) => s.parse::<i64>().ok().map(|n| Value::Number(n.into())),
            ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
            ("boolean", Value::String(s)) => match s.to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        };

        if let Some(coerced) = coerced {
            out.insert(name.clone(), coerced);
        }
    }
    Value::Object(out)
}

/// Validates `args` against `tool`'s schema; on failure, attempts coercion
/// and validates again. Returns the (possibly coerced) arguments on success,
/// or a `ToolInvalidArgs` error naming the tool, the first validator
/// message, and the original arguments.
pub fn validate_and_coerce(tool: &Tool, args: Value) -> Result<Value> {
    let schema = tool.input_schema();
    match validate(schema, &args) {
        None => Ok(args),
        Some(first_error) => {
            let coerced = coerce(schema, &args);
            match validate(schema, &coerced) {
                None => Ok(coerced),
                Some(_) => Err(crate::error::Error::tool_invalid_args(
                    tool.name(),
                    first_error,
                    args,
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    #[test]
    fn test_type_to_json_schema() {
        assert_eq!(type_to_json_schema("string"), json!({"type": "string"}));
        assert_eq!(type_to_json_schema("integer"), json!({"type": "integer"}));
        assert_eq!(type_to_json_schema("number"), json!({"type": "number"}));
        assert_eq!(type_to_json_schema("bool"), json!({"type": "boolean"}));
    }

    #[test]
    fn test_convert_simple_schema() {
        let schema = json!({"location": "string", "units": "string"});
        let result = convert_schema_to_openai(schema);
        assert_eq!(result["type"], "object");
        assert_eq!(result["properties"]["location"]["type"], "string");
        assert_eq!(result["required"], json!(["location", "units"]));
    }

    #[test]
    fn test_convert_full_schema() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        let result = convert_schema_to_openai(schema.clone());
        assert_eq!(result, schema);
    }

    #[test]
    fn test_extended_schema_honors_optional_and_default() {
        let schema = json!({
            "query": {"type": "string"},
            "limit": {"type": "integer", "optional": true},
            "verbose": {"type": "boolean", "default": false}
        });
        let result = convert_schema_to_openai(schema);
        let required: Vec<&str> = result["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["query"]);
    }

    #[tokio::test]
    async fn test_tool_creation() {
        let add_tool = tool("add", "Add two numbers")
            .param("a", "number")
            .param("b", "number")
            .build(|args| async move {
                let a = args
                    .get("a")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::invalid_input("Parameter 'a' must be a number"))?;
                let b = args
                    .get("b")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::invalid_input("Parameter 'b' must be a number"))?;
                Ok(json!({"result": a + b}))
            });

        assert_eq!(add_tool.name, "add");
        let out = add_tool.execute(json!({"a": 5.0, "b": 3.0}), None).await.unwrap();
        assert_eq!(out.content.len(), 1);
        assert!(out.content[0].as_text().unwrap().contains("8"));
    }

    #[test]
    fn test_tool_to_openai_format() {
        let tool = tool("test", "Test tool")
            .param("param1", "string")
            .build(|_| async { Ok(json!({})) });

        let format = tool.to_openai_format();
        assert_eq!(format["type"], "function");
        assert_eq!(format["function"]["name"], "test");
        assert!(format["function"]["parameters"].is_object());
    }

    #[test]
    fn test_param_after_non_object_schema() {
        let tool = tool("test", "Test tool")
            .schema(json!("string"))
            .param("key", "number")
            .build(|_| async { Ok(json!({})) });

        let format = tool.to_openai_format();
        assert!(format["function"]["parameters"]["properties"]["key"].is_object());
    }

    #[test]
    fn registry_register_rejects_duplicate() {
        let registry = ToolRegistry::new();
        let make = || tool("echo", "echo").build(|args| async move { Ok(args) });
        registry.register(make()).unwrap();
        let err = registry.register(make()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn registry_register_or_replace_overwrites() {
        let registry = ToolRegistry::new();
        registry.register_or_replace(tool("echo", "v1").build(|args| async move { Ok(args) }));
        registry.register_or_replace(tool("echo", "v2").build(|args| async move { Ok(args) }));
        assert_eq!(registry.get("echo").unwrap().description(), "v2");
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }

    #[test]
    fn registry_remove_and_all() {
        let registry = ToolRegistry::new();
        registry.register(tool("a", "a").build(|args| async move { Ok(args) })).unwrap();
        registry.register(tool("b", "b").build(|args| async move { Ok(args) })).unwrap();
        assert_eq!(registry.all().len(), 2);
        assert!(registry.remove("a").is_some());
        assert_eq!(registry.all().len(), 1);
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn validate_and_coerce_passes_through_valid_args() {
        let add = tool("add", "add").param("a", "number").build(|args| async move { Ok(args) });
        let args = json!({"a": 1.0});
        let result = validate_and_coerce(&add, args.clone()).unwrap();
        assert_eq!(result, args);
    }

    #[test]
    fn validate_and_coerce_coerces_numeric_string() {
        let add = tool("add", "add").param("a", "number").build(|args| async move { Ok(args) });
        let result = validate_and_coerce(&add, json!({"a": "3.5"})).unwrap();
        assert_eq!(result["a"], 3.5);
    }

    #[test]
    fn validate_and_coerce_coerces_boolean_string_case_insensitive() {
        let t = tool("t", "t").param("flag", "boolean").build(|args| async move { Ok(args) });
        let result = validate_and_coerce(&t, json!({"flag": "TRUE"})).unwrap();
        assert_eq!(result["flag"], true);
    }

    #[test]
    fn validate_and_coerce_fails_on_missing_required() {
        let add = tool("add", "add").param("a", "number").build(|args| async move { Ok(args) });
        let err = validate_and_coerce(&add, json!({})).unwrap_err();
        assert!(matches!(err, Error::ToolInvalidArgs { .. }));
    }

    #[test]
    fn validate_and_coerce_fails_open_on_unparseable_schema() {
        let t = tool("t", "t").build(|args| async move { Ok(args) });
        let t = Tool {
            input_schema: json!("not-a-schema"),
            ..t
        };
        let result = validate_and_coerce(&t, json!({"anything": 1})).unwrap();
        assert_eq!(result, json!({"anything": 1}));
    }
}
