//! Shared scripted `Provider` test double for integration tests. One turn
//! of content per prompt; once the script is exhausted it answers "done".

use async_trait::async_trait;
use futures::stream::{self, StreamExt as _};
use open_agent::{
    ContentBlock, Message, Provider, ProviderOptions, ProviderStream, Result, StopReason,
    StreamEvent, Usage,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct ScriptedProvider {
    turns: Mutex<Vec<Vec<ContentBlock>>>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<ContentBlock>>) -> Self {
        Self {
            turns: Mutex::new(turns),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        model: &str,
        _history: &[Message],
        _options: &ProviderOptions,
    ) -> Result<ProviderStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                vec![ContentBlock::text("done")]
            } else {
                turns.remove(0)
            }
        };
        let has_tool_call = content.iter().any(|b| matches!(b, ContentBlock::ToolCall(_)));
        let stop_reason = if has_tool_call { StopReason::ToolUse } else { StopReason::Stop };
        let message = Message::Assistant {
            content,
            model: model.to_string(),
            provider: "scripted".to_string(),
            usage: Usage::default(),
            stop_reason,
            error: None,
            timestamp: 0,
        };
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _ = tx.send(Ok(message));
        let events = stream::iter(Vec::<StreamEvent>::new()).boxed();
        Ok(ProviderStream { events, result: rx })
    }
}

/// Minimal scoped temp dir, mirroring `session.rs`'s own test helper, since
/// the dev-dependencies don't include `tempfile`.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn tempdir() -> TempDir {
    let mut dir = std::env::temp_dir();
    let unique: u64 = rand::thread_rng().r#gen();
    dir.push(format!("open-agent-integration-test-{unique}"));
    std::fs::create_dir_all(&dir).unwrap();
    TempDir(dir)
}
