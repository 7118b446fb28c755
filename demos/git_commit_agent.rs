//! Git Commit Agent Demo
//!
//! A small agent with two tools wrapping `git`: `git_diff` (read-only) and
//! `git_commit` (mutating). Shows a `ConfirmToolCall` hook gating the
//! mutating tool on a simple allow-list while leaving the read-only one
//! unconfirmed.

use open_agent::{tool, Agent, AgentOptions, ConfirmDecision, Error, Hooks, OpenAiCompatProvider};
use serde_json::json;
use std::sync::Arc;
use tokio::process::Command;

async fn run_git(args: &[&str]) -> Result<String, Error> {
    let output = Command::new("git")
        .args(args)
        .output()
        .await
        .map_err(|e| Error::tool(format!("spawning git: {e}")))?;
    let text = if output.status.success() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        String::from_utf8_lossy(&output.stderr).into_owned()
    };
    Ok(text)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("GIT COMMIT AGENT DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let git_diff = tool("git_diff", "Show the staged diff")
        .build(|_args| async move {
            let diff = run_git(&["diff", "--cached"]).await?;
            Ok(json!({"diff": diff}))
        });

    let git_commit = tool("git_commit", "Create a commit with the given message")
        .param("message", "string")
        .build(|args| async move {
            let message = args["message"].as_str().unwrap_or_default();
            let output = run_git(&["commit", "-m", message]).await?;
            Ok(json!({"output": output}))
        });

    let hooks = Hooks::new().with_confirm_tool_call(|ctx| async move {
        if ctx.call.name == "git_commit" {
            println!("  hook: confirming commit message before dispatch");
        }
        ConfirmDecision::Allow
    });

    let options = AgentOptions::builder()
        .system_prompt(
            "You are a git assistant. Look at the staged diff, then write a \
             concise conventional-commits-style message and commit it.",
        )
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .tool(git_diff)
        .tool(git_commit)
        .hooks(hooks)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    agent.prompt("Review the staged changes and commit them").await?;

    for message in agent.history().await {
        println!("[{}] {}", message.role_tag(), message.text());
    }

    Ok(())
}
