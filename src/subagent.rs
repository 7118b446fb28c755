//! Sub-agent wrapper (spec "Sub-Agent"): one agent driven by a parent,
//! either invoked directly for its final text ([`run`]) or exposed to the
//! parent's model as a tool ([`as_tool`]) whose dispatch forwards the
//! sub-agent's streaming deltas to the parent as `ToolUpdate` events.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::events::Event;
use crate::message::Message;
use crate::provider::Provider;
use crate::scheduler::Agent;
use crate::tools::{OnUpdate, Tool, ToolOutput};
use crate::types::AgentOptions;

/// Concatenation of every `Text` block in the last assistant message, or an
/// error if the history contains no assistant message (the run ended in an
/// error turn before ever producing one).
fn final_text(history: &[Message]) -> Result<String> {
    history
        .iter()
        .rev()
        .find(|m| matches!(m, Message::Assistant { .. }))
        .map(Message::text)
        .ok_or_else(|| Error::other("sub-agent run produced no assistant message"))
}

/// Drives a fresh agent over `prompt` to completion and returns the final
/// assistant text. Blocks until the run ends; `options` sets its own turn
/// and cost limits independent of any parent.
pub async fn run(
    options: AgentOptions,
    provider: Arc<dyn Provider>,
    prompt: impl Into<String>,
) -> Result<String> {
    let agent = Agent::new(options, provider)?;
    agent.prompt(prompt).await?;
    final_text(&agent.history().await)
}

/// Wraps a sub-agent as a [`Tool`] a parent can register and the model can
/// call. The tool's only parameter is `prompt` (string, required). Each
/// dispatch constructs a fresh sub-agent from `options`/`provider`, relays
/// its text and thinking deltas to the parent's `on_update` callback as they
/// stream, and returns the sub-agent's final assistant text as the tool
/// result.
pub fn as_tool(
    name: impl Into<String>,
    description: impl Into<String>,
    options: AgentOptions,
    provider: Arc<dyn Provider>,
) -> Tool {
    let options = Arc::new(options);
    Tool::with_updates(
        name,
        description,
        json!({"prompt": "string"}),
        move |args, on_update: Option<OnUpdate>| {
            let options = (*options).clone();
            let provider = provider.clone();
            async move {
                let prompt = args
                    .get("prompt")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::invalid_input("sub-agent tool requires a string 'prompt' argument")
                    })?
                    .to_string();

                let agent = Agent::new(options, provider)?;
                let unsubscribe = on_update.map(|on_update| {
                    agent.subscribe(move |event| {
                        if let Event::MessageUpdate { delta } = event {
                            on_update(ToolOutput::text(delta.clone()));
                        }
                    })
                });

                let result = agent.prompt(prompt).await;
                if let Some(unsubscribe) = unsubscribe {
                    unsubscribe.unsubscribe();
                }
                result?;

                let text = final_text(&agent.history().await)?;
                Ok(ToolOutput::text(text))
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentBlock, StopReason, Usage};
    use crate::provider::{PartialMessage, ProviderOptions, ProviderStream, StreamEvent};
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt as _};

    /// Single-turn provider double: streams one text delta, then returns a
    /// terminal assistant message with no tool calls.
    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn stream(
            &self,
            model: &str,
            _history: &[Message],
            _options: &ProviderOptions,
        ) -> Result<ProviderStream> {
            let partial = PartialMessage {
                content: vec![ContentBlock::text("hello from sub-agent")],
            };
            let events = stream::iter(vec![StreamEvent::TextDelta {
                partial,
                delta: "hello from sub-agent".to_string(),
            }])
            .boxed();
            let message = Message::Assistant {
                content: vec![ContentBlock::text("hello from sub-agent")],
                model: model.to_string(),
                provider: "echo".to_string(),
                usage: Usage::default(),
                stop_reason: StopReason::Stop,
                error: None,
                timestamp: 0,
            };
            let (tx, rx) = tokio::sync::oneshot::channel();
            let _ = tx.send(Ok(message));
            Ok(ProviderStream { events, result: rx })
        }
    }

    fn test_options() -> AgentOptions {
        AgentOptions::builder()
            .model("test-model")
            .base_url("http://localhost:1")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn run_returns_final_assistant_text() {
        let text = run(test_options(), Arc::new(EchoProvider), "hi").await.unwrap();
        assert_eq!(text, "hello from sub-agent");
    }

    #[tokio::test]
    async fn as_tool_forwards_deltas_and_returns_text() {
        let tool = as_tool("delegate", "delegate to a sub-agent", test_options(), Arc::new(EchoProvider));
        let registry = crate::tools::ToolRegistry::new();
        registry.register(tool).unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let on_update: OnUpdate = Arc::new(move |output: ToolOutput| {
            seen2.lock().unwrap().push(output.content[0].as_text().unwrap().to_string());
        });

        let output = registry
            .get("delegate")
            .unwrap()
            .execute(json!({"prompt": "hi"}), Some(on_update))
            .await
            .unwrap();

        assert_eq!(output.content[0].as_text().unwrap(), "hello from sub-agent");
        assert_eq!(*seen.lock().unwrap(), vec!["hello from sub-agent".to_string()]);
    }

    #[tokio::test]
    async fn as_tool_rejects_missing_prompt() {
        let tool = as_tool("delegate", "delegate", test_options(), Arc::new(EchoProvider));
        let err = tool.execute(json!({}), None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
