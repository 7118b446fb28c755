//! Provider adapter for OpenAI-compatible chat completion servers (LM Studio,
//! Ollama, llama.cpp, vLLM). Generalizes the original SDK's `utils.rs` SSE
//! parser and `client.rs` request-building into the `Provider` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::{ContentBlock, ImageDetail, Message, StopReason, ToolDefinition, Usage};
use crate::provider::{PartialMessage, Provider, ProviderOptions, ProviderStream, StreamEvent};

// ---------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIToolFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    #[allow(dead_code)]
    id: Option<String>,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
    /// Extended-thinking/reasoning delta, surfaced by some vLLM/llama.cpp
    /// builds. Not part of the OpenAI spec proper; absent elsewhere.
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ---------------------------------------------------------------------
// History -> wire conversion
// ---------------------------------------------------------------------

fn content_blocks_to_value(blocks: &[ContentBlock]) -> Value {
    let has_image = blocks
        .iter()
        .any(|b| matches!(b, ContentBlock::Image { .. }));
    if !has_image {
        let text: String = blocks
            .iter()
            .filter_map(|b| b.as_text())
            .collect::<Vec<_>>()
            .join("");
        return Value::String(text);
    }

    let parts: Vec<Value> = blocks
        .iter()
        .map(|b| match b {
            ContentBlock::Text { text } | ContentBlock::Thinking { text } => {
                serde_json::json!({"type": "text", "text": text})
            }
            ContentBlock::Image { data, media_type, detail } => {
                let url = format!("data:{media_type};base64,{data}");
                let detail_str = match detail {
                    ImageDetail::Low => "low",
                    ImageDetail::High => "high",
                    ImageDetail::Auto => "auto",
                };
                serde_json::json!({
                    "type": "image_url",
                    "image_url": {"url": url, "detail": detail_str}
                })
            }
            ContentBlock::ToolCall(_) => Value::Null,
        })
        .filter(|v| !v.is_null())
        .collect();
    Value::Array(parts)
}

fn history_to_wire(history: &[Message], system_prompt: Option<&str>) -> Vec<OpenAIMessage> {
    let mut out = Vec::with_capacity(history.len() + 1);
    if let Some(sys) = system_prompt {
        out.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(Value::String(sys.to_string())),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    for msg in history {
        match msg {
            Message::User { content, .. } => out.push(OpenAIMessage {
                role: "user".to_string(),
                content: Some(content_blocks_to_value(content)),
                tool_calls: None,
                tool_call_id: None,
            }),
            Message::Assistant { content, .. } => {
                let text: String = content.iter().filter_map(|b| b.as_text()).collect();
                let tool_calls: Vec<OpenAIToolCall> = content
                    .iter()
                    .filter_map(|b| b.as_tool_call())
                    .map(|call| OpenAIToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: OpenAIFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect();
                out.push(OpenAIMessage {
                    role: "assistant".to_string(),
                    content: if text.is_empty() { None } else { Some(Value::String(text)) },
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                });
            }
            Message::ToolResult { call_id, content, .. } => {
                let text: String = content
                    .iter()
                    .filter_map(|b| b.as_text())
                    .collect::<Vec<_>>()
                    .join("\n");
                out.push(OpenAIMessage {
                    role: "tool".to_string(),
                    content: Some(Value::String(text)),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                });
            }
        }
    }
    out
}

fn tool_definitions_to_wire(tools: &[ToolDefinition]) -> Option<Vec<OpenAITool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| OpenAITool {
                kind: "function",
                function: OpenAIToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------
// SSE aggregation
// ---------------------------------------------------------------------

#[derive(Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates SSE chunks into `StreamEvent`s plus the final assistant
/// message. Text deltas are forwarded as they arrive; tool-call directives
/// are only known complete once `finish_reason` lands on a choice (same
/// simplification the original `ToolCallAggregator` made), so their start/end
/// pair is emitted together at that point.
struct Aggregator {
    text_buffer: String,
    thinking_buffer: String,
    tool_calls: HashMap<u32, PendingToolCall>,
    tool_call_order: Vec<u32>,
    text_open: bool,
    thinking_open: bool,
    usage: Usage,
    finish_reason: Option<String>,
}

impl Aggregator {
    fn new() -> Self {
        Self {
            text_buffer: String::new(),
            thinking_buffer: String::new(),
            tool_calls: HashMap::new(),
            tool_call_order: Vec::new(),
            text_open: false,
            thinking_open: false,
            usage: Usage::default(),
            finish_reason: None,
        }
    }

    fn partial(&self) -> PartialMessage {
        let mut content = Vec::new();
        if !self.thinking_buffer.is_empty() {
            content.push(ContentBlock::thinking(self.thinking_buffer.clone()));
        }
        if !self.text_buffer.is_empty() {
            content.push(ContentBlock::text(self.text_buffer.clone()));
        }
        for idx in &self.tool_call_order {
            if let Some(call) = self.tool_calls.get(idx) {
                if let (Some(id), Some(name)) = (&call.id, &call.name) {
                    let args = serde_json::from_str(&call.arguments)
                        .unwrap_or_else(|_| serde_json::json!({}));
                    content.push(ContentBlock::tool_call(id.clone(), name.clone(), args));
                }
            }
        }
        PartialMessage { content }
    }

    /// Applies one SSE data line, emitting zero or more `StreamEvent`s.
    fn apply_chunk(&mut self, chunk: OpenAIChunk, events: &mut Vec<StreamEvent>) {
        if let Some(usage) = chunk.usage {
            self.usage.input_tokens = usage.prompt_tokens;
            self.usage.output_tokens = usage.completion_tokens;
        }
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(reasoning) = choice.delta.reasoning_content {
            if !reasoning.is_empty() {
                if !self.thinking_open {
                    self.thinking_open = true;
                    events.push(StreamEvent::ThinkingStart { partial: self.partial() });
                }
                self.thinking_buffer.push_str(&reasoning);
                events.push(StreamEvent::ThinkingDelta {
                    partial: self.partial(),
                    delta: reasoning,
                });
            }
        }

        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                if self.thinking_open {
                    self.thinking_open = false;
                    events.push(StreamEvent::ThinkingEnd { partial: self.partial() });
                }
                if !self.text_open {
                    self.text_open = true;
                    events.push(StreamEvent::TextStart { partial: self.partial() });
                }
                self.text_buffer.push_str(&text);
                events.push(StreamEvent::TextDelta {
                    partial: self.partial(),
                    delta: text,
                });
            }
        }

        if let Some(deltas) = choice.delta.tool_calls {
            for delta in deltas {
                let entry = self.tool_calls.entry(delta.index).or_default();
                if entry.id.is_none() && entry.name.is_none() {
                    self.tool_call_order.push(delta.index);
                }
                if let Some(id) = delta.id {
                    entry.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name = Some(name);
                    }
                    if let Some(args) = function.arguments {
                        entry.arguments.push_str(&args);
                    }
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            if self.text_open {
                self.text_open = false;
                events.push(StreamEvent::TextEnd { partial: self.partial() });
            }
            if self.thinking_open {
                self.thinking_open = false;
                events.push(StreamEvent::ThinkingEnd { partial: self.partial() });
            }
            for idx in &self.tool_call_order.clone() {
                if let Some(call) = self.tool_calls.get(idx) {
                    if let (Some(id), Some(name)) = (call.id.clone(), call.name.clone()) {
                        events.push(StreamEvent::ToolCallStart {
                            partial: self.partial(),
                            name,
                            call_id: id,
                        });
                        events.push(StreamEvent::ToolCallEnd { partial: self.partial() });
                    }
                }
            }
            self.finish_reason = Some(reason);
            events.push(StreamEvent::Done { partial: self.partial() });
        }
    }

    fn stop_reason(&self) -> StopReason {
        match self.finish_reason.as_deref() {
            Some("stop") => StopReason::Stop,
            Some("length") => StopReason::Length,
            Some("tool_calls") => StopReason::ToolUse,
            Some(_) => StopReason::Error,
            None => StopReason::Error,
        }
    }
}

/// Splits raw SSE bytes into `data: ` payload lines, dropping the `[DONE]`
/// sentinel. Mirrors the original `parse_sse_stream` line-splitting.
fn extract_data_lines(buffer: &mut String, incoming: &str) -> Vec<String> {
    buffer.push_str(incoming);
    let mut lines = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim_end_matches('\r').to_string();
        buffer.drain(..=pos);
        if let Some(rest) = line.strip_prefix("data: ") {
            if rest != "[DONE]" {
                lines.push(rest.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.trim();
            if rest != "[DONE]" && !rest.is_empty() {
                lines.push(rest.to_string());
            }
        }
    }
    lines
}

// ---------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------

/// Adapter for any server exposing an OpenAI-compatible `/chat/completions`
/// streaming endpoint.
pub struct OpenAiCompatProvider {
    http: HttpClient,
    base_url: String,
    name: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.into(),
            name: "openai-compat".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_http_client(mut self, client: HttpClient) -> Self {
        self.http = client;
        self
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        model: &str,
        history: &[Message],
        options: &ProviderOptions,
    ) -> Result<ProviderStream> {
        let request = OpenAIRequest {
            model: model.to_string(),
            messages: history_to_wire(history, options.system_prompt.as_deref()),
            stream: true,
            max_tokens: options.max_output_tokens,
            temperature: options.temperature,
            tools: tool_definitions_to_wire(&options.tools),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut req = self.http.post(&url).json(&request);
        if let Some(key) = &options.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(Error::Http)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(format!("{status}: {body}")));
        }

        let mut byte_stream = response.bytes_stream();
        let model_name = model.to_string();
        let provider_name = self.name.clone();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel::<StreamEvent>();

        tokio::spawn(async move {
            let mut agg = Aggregator::new();
            let mut buffer = String::new();
            let mut final_sent = false;

            let _ = event_tx.send(StreamEvent::Start { partial: agg.partial() });

            loop {
                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        let text = String::from_utf8_lossy(&bytes);
                        let lines = extract_data_lines(&mut buffer, &text);
                        for line in lines {
                            match serde_json::from_str::<OpenAIChunk>(&line) {
                                Ok(chunk) => {
                                    let mut events = Vec::new();
                                    agg.apply_chunk(chunk, &mut events);
                                    for ev in events {
                                        let _ = event_tx.send(ev);
                                    }
                                }
                                Err(_) => continue,
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = event_tx.send(StreamEvent::Error { message: e.to_string() });
                        let _ = tx.send(Err(Error::stream(e.to_string())));
                        final_sent = true;
                        break;
                    }
                    None => break,
                }
            }

            if !final_sent {
                let stop_reason = agg.stop_reason();
                let usage = agg.usage;
                let message = Message::Assistant {
                    content: agg.partial().content,
                    model: model_name,
                    provider: provider_name,
                    usage,
                    stop_reason,
                    error: None,
                    timestamp: crate::message::now_ms(),
                };
                let _ = tx.send(Ok(message));
            }
        });

        let events = stream::unfold(event_rx, |mut rx| async move {
            rx.recv().await.map(|ev| (ev, rx))
        })
        .boxed();

        Ok(ProviderStream { events, result: rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_data_lines_and_skips_done_sentinel() {
        let mut buffer = String::new();
        let lines = extract_data_lines(
            &mut buffer,
            "data: {\"a\":1}\n\ndata: [DONE]\n",
        );
        assert_eq!(lines, vec!["{\"a\":1}"]);
    }

    #[test]
    fn aggregator_flushes_text_on_finish_reason() {
        let mut agg = Aggregator::new();
        let mut events = Vec::new();
        agg.apply_chunk(
            OpenAIChunk {
                id: None,
                usage: None,
                choices: vec![OpenAIChoice {
                    delta: OpenAIDelta {
                        content: Some("hi".to_string()),
                        reasoning_content: None,
                        tool_calls: None,
                    },
                    finish_reason: None,
                }],
            },
            &mut events,
        );
        agg.apply_chunk(
            OpenAIChunk {
                id: None,
                usage: None,
                choices: vec![OpenAIChoice {
                    delta: OpenAIDelta::default(),
                    finish_reason: Some("stop".to_string()),
                }],
            },
            &mut events,
        );
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
        assert_eq!(agg.stop_reason(), StopReason::Stop);
    }

    #[test]
    fn aggregator_drops_incomplete_tool_call() {
        let mut agg = Aggregator::new();
        let mut events = Vec::new();
        agg.apply_chunk(
            OpenAIChunk {
                id: None,
                usage: None,
                choices: vec![OpenAIChoice {
                    delta: OpenAIDelta {
                        content: None,
                        reasoning_content: None,
                        tool_calls: Some(vec![OpenAIToolCallDelta {
                            index: 0,
                            id: None,
                            function: Some(OpenAIFunctionDelta {
                                name: None,
                                arguments: Some("{}".to_string()),
                            }),
                        }]),
                    },
                    finish_reason: Some("tool_calls".to_string()),
                }],
            },
            &mut events,
        );
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::ToolCallStart { .. })));
    }

    #[test]
    fn history_to_wire_maps_tool_result_role() {
        let history = vec![Message::tool_result("c1", "echo", vec![ContentBlock::text("echo:world")], false)];
        let wire = history_to_wire(&history, None);
        assert_eq!(wire[0].role, "tool");
        assert_eq!(wire[0].tool_call_id.as_deref(), Some("c1"));
    }
}
