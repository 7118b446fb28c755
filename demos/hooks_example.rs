//! Hooks Example
//!
//! Demonstrates the two hook families the scheduler calls into:
//! - `UserPromptSubmit`/`PreToolUse`/`PostToolUse`: multi-handler, first
//!   non-`None` decision wins. Good for input sanitization and auditing.
//! - `ConfirmToolCall`: single-slot scheduler gate that can allow, deny, or
//!   abort a pending tool call before it dispatches.

use open_agent::{
    tool, Agent, AgentOptions, ConfirmDecision, HookDecision, Hooks, OpenAiCompatProvider,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("HOOKS EXAMPLE");
    println!("{}", "=".repeat(70));
    println!();

    // ------------------------------------------------------------------
    // Example 1: UserPromptSubmit - block or modify the incoming prompt
    // ------------------------------------------------------------------
    println!("Example 1: Input Sanitization Hook");
    println!("{}", "-".repeat(70));

    let hooks = Hooks::new().add_user_prompt_submit(|event| async move {
        if event.prompt.contains("DELETE") || event.prompt.contains("DESTROY") {
            println!("  hook: blocked dangerous prompt");
            return Some(HookDecision::block("dangerous keywords detected"));
        }
        if event.prompt.contains("write") || event.prompt.contains("modify") {
            let safe_prompt = format!("{} (confirm this is safe before proceeding)", event.prompt);
            println!("  hook: added safety note to prompt");
            return Some(HookDecision::modify_prompt(safe_prompt, "added safety note"));
        }
        None
    });

    let options = AgentOptions::builder()
        .system_prompt("You are a helpful assistant")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .hooks(hooks)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    println!("\nTest: dangerous prompt");
    match agent.prompt("DELETE all files").await {
        Ok(()) => println!("prompt accepted"),
        Err(e) => println!("prompt rejected: {e}"),
    }

    // ------------------------------------------------------------------
    // Example 2: ConfirmToolCall - deny one tool, allow the rest
    // ------------------------------------------------------------------
    println!("\n{}", "=".repeat(70));
    println!("Example 2: ConfirmToolCall Hook");
    println!("{}", "-".repeat(70));

    let confirm_hooks = Hooks::new().with_confirm_tool_call(|ctx| async move {
        if ctx.call.name == "delete_file" {
            println!("  hook: denying call to delete_file");
            ConfirmDecision::Deny
        } else {
            ConfirmDecision::Allow
        }
    });

    let delete_file = tool("delete_file", "Delete a file from disk")
        .param("path", "string")
        .build(|args| async move {
            let path = args["path"].as_str().unwrap_or_default();
            Ok(json!({"deleted": path}))
        });

    let confirm_options = AgentOptions::builder()
        .system_prompt("You are a file management assistant")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .tool(delete_file)
        .hooks(confirm_hooks)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(confirm_options.base_url()));
    let agent = Agent::new(confirm_options, provider)?;
    agent.prompt("Please delete /tmp/scratch.txt").await?;

    for message in agent.history().await {
        println!("[{}] {}", message.role_tag(), message.text());
    }

    Ok(())
}
