//! Advanced Patterns Demo
//!
//! Combines several pieces that each have their own focused demo elsewhere:
//! a sub-agent exposed as a parent's tool, an `OnMetrics` hook observing
//! per-turn cost, and a `FollowUp` hook that keeps a run going one extra
//! turn after the model would otherwise stop.

use open_agent::{subagent, Agent, AgentOptions, Hooks, Message, OpenAiCompatProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("ADVANCED PATTERNS DEMO");
    println!("{}", "=".repeat(70));
    println!();

    // ------------------------------------------------------------------
    // A specialist sub-agent, exposed to the parent as an ordinary tool.
    // ------------------------------------------------------------------
    let researcher_options = AgentOptions::builder()
        .system_prompt("You are a concise research assistant. Answer in two sentences.")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .build()?;
    let researcher_provider = Arc::new(OpenAiCompatProvider::new(researcher_options.base_url()));

    let research_tool = subagent::as_tool(
        "research",
        "Delegate a research question to a specialist sub-agent",
        researcher_options,
        researcher_provider,
    );

    // ------------------------------------------------------------------
    // Hooks: report per-turn cost, and ask one follow-up question once the
    // model stops on its own.
    // ------------------------------------------------------------------
    let followed_up = Arc::new(AtomicBool::new(false));
    let followed_up_hook = followed_up.clone();

    let hooks = Hooks::new()
        .with_on_metrics(|metrics| {
            println!(
                "  turn {}: {} in / {} out tokens, ${:.4}",
                metrics.turn_index, metrics.input_tokens, metrics.output_tokens, metrics.cost_usd
            );
        })
        .with_follow_up(move || {
            let followed_up = followed_up_hook.clone();
            async move {
                if followed_up.swap(true, Ordering::SeqCst) {
                    None
                } else {
                    Some(vec![Message::user("One more thing: summarize that in a single sentence.")])
                }
            }
        });

    let options = AgentOptions::builder()
        .system_prompt("You are a helpful assistant with access to a research specialist.")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .tool(research_tool)
        .hooks(hooks)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    agent
        .prompt("Use the research tool to find out why the sky is blue")
        .await?;

    println!();
    for message in agent.history().await {
        println!("[{}] {}", message.role_tag(), message.text());
    }

    Ok(())
}
