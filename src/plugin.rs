//! Subprocess plugin transport (spec §4.2.2).
//!
//! A plugin tool is an external executable speaking one line-delimited
//! JSON object per message over stdin/stdout. [`Plugin::spawn`] launches
//! the process and issues the `describe` handshake; [`Plugin::into_tool`]
//! wraps the result as an ordinary [`crate::tools::Tool`] the registry can
//! hold alongside in-process tools. Calls to one plugin are serialized by
//! an internal mutex — the protocol allows exactly one in-flight call per
//! process; separate plugin processes still run in parallel as normal
//! tools.

use crate::error::{Error, Result};
use crate::message::ContentBlock;
use crate::tools::{Tool, ToolOutput};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request<'a> {
    Describe,
    Call {
        call_id: &'a str,
        params: Value,
    },
}

#[derive(Deserialize)]
struct DescribeResponse {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct CallResponse {
    content: Vec<PluginContentBlock>,
    #[serde(default)]
    error: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PluginContentBlock {
    Text { text: String },
}

struct Transport {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Transport {
    async fn send(&mut self, request: &Request<'_>) -> Result<String> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| Error::plugin_protocol(format!("encoding request: {e}")))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::plugin_protocol(format!("writing to plugin stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::plugin_protocol(format!("flushing plugin stdin: {e}")))?;

        let response = self
            .stdout
            .next_line()
            .await
            .map_err(|e| Error::plugin_protocol(format!("reading plugin stdout: {e}")))?
            .ok_or_else(|| Error::plugin_protocol("plugin closed stdout without responding"))?;
        Ok(response)
    }
}

/// A running plugin process plus its static tool definition, obtained via
/// the `describe` handshake at spawn time.
pub struct Plugin {
    name: String,
    description: String,
    parameters: Value,
    transport: Mutex<Transport>,
}

impl Plugin {
    /// Launch `command` with `args`, perform the `describe` handshake, and
    /// return the plugin ready for calls. Plugin stderr is piped so a host
    /// can forward it to a logger; it is not part of the protocol.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::plugin_protocol(format!("spawning plugin '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::plugin_protocol("plugin process has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::plugin_protocol("plugin process has no stdout"))?;
        let stdout = BufReader::new(stdout).lines();

        let mut transport = Transport { child, stdin, stdout };

        let response = transport.send(&Request::Describe).await?;
        let describe: DescribeResponse = serde_json::from_str(&response)
            .map_err(|e| Error::plugin_protocol(format!("parsing describe response: {e}")))?;

        Ok(Self {
            name: describe.name,
            description: describe.description,
            parameters: describe.parameters,
            transport: Mutex::new(transport),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issue one `call` round-trip. Serialized against other in-flight
    /// calls to this same plugin by the transport's mutex.
    async fn call(&self, params: Value) -> Result<ToolOutput> {
        let call_id = generate_call_id();
        let request = Request::Call { call_id: &call_id, params };

        let response = {
            let mut transport = self.transport.lock().await;
            transport.send(&request).await?
        };

        let parsed: CallResponse = serde_json::from_str(&response)
            .map_err(|e| Error::plugin_protocol(format!("parsing call response: {e}")))?;

        let content: Vec<ContentBlock> = parsed
            .content
            .into_iter()
            .map(|b| match b {
                PluginContentBlock::Text { text } => ContentBlock::text(text),
            })
            .collect();

        if parsed.error {
            let text = content
                .iter()
                .filter_map(|b| b.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::tool(format!("plugin '{}' reported an error: {}", self.name, text)));
        }

        Ok(ToolOutput { content, details: None })
    }

    /// Terminate the process. Not part of the wire protocol — an orderly
    /// close isn't required, so this just kills it.
    pub async fn shutdown(&self) {
        let mut transport = self.transport.lock().await;
        let _ = transport.child.start_kill();
    }

    /// Wrap this plugin as a `Tool` the registry can hold like any other.
    /// `on_update` is never invoked: the plugin protocol has no progress
    /// channel, only a single request/response pair per call.
    pub fn into_tool(self: Arc<Self>) -> Tool {
        let name = self.name.clone();
        let description = self.description.clone();
        let parameters = self.parameters.clone();
        Tool::with_updates(name, description, parameters, move |args, _on_update| {
            let plugin = self.clone();
            async move { plugin.call(args).await }
        })
    }
}

fn generate_call_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 6] = rng.r#gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plugins are external processes; spawning a real one belongs in an
    /// integration test with a fixture script. Here we only check the wire
    /// encoding of the request/response protocol.
    #[test]
    fn describe_request_encodes_correctly() {
        let json = serde_json::to_string(&Request::Describe).unwrap();
        assert_eq!(json, r#"{"type":"describe"}"#);
    }

    #[test]
    fn call_request_encodes_correctly() {
        let json = serde_json::to_string(&Request::Call {
            call_id: "abc123",
            params: serde_json::json!({"x": 1}),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"call","call_id":"abc123","params":{"x":1}}"#);
    }

    #[test]
    fn describe_response_parses() {
        let raw = r#"{"name":"search","description":"web search","parameters":{"query":"string"}}"#;
        let parsed: DescribeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.name, "search");
    }

    #[test]
    fn call_response_parses_success() {
        let raw = r#"{"content":[{"type":"text","text":"ok"}],"error":false}"#;
        let parsed: CallResponse = serde_json::from_str(raw).unwrap();
        assert!(!parsed.error);
        assert_eq!(parsed.content.len(), 1);
    }

    #[test]
    fn call_response_defaults_error_to_false() {
        let raw = r#"{"content":[]}"#;
        let parsed: CallResponse = serde_json::from_str(raw).unwrap();
        assert!(!parsed.error);
    }
}
