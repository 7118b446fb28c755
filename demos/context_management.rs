//! Context Management Demo
//!
//! Shows the two pieces that keep a long-running agent inside its context
//! window: the scheduler's own compaction engine (triggered automatically
//! before a turn that would overflow) and a session log that survives a
//! process restart.

use open_agent::{Agent, AgentOptions, CompactionConfig, OpenAiCompatProvider, Session};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("CONTEXT MANAGEMENT DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let session = Session::create("./demos/.sessions").await?;
    println!("session log: {}", session.path().display());

    let options = AgentOptions::builder()
        .system_prompt("You are a helpful assistant")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .compaction(CompactionConfig {
            enabled: true,
            context_window: 8_000,
            reserve_tokens: 1_000,
            keep_recent_tokens: 2_000,
        })
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?.with_session(session);

    let _unsubscribe = agent.subscribe(|event| {
        if let open_agent::Event::Compaction { removed_messages, summary_tokens } = event {
            println!(
                "compaction triggered: removed {removed_messages} messages, summary is ~{summary_tokens} tokens"
            );
        }
    });

    for turn in ["Tell me about the history of Rome.", "What happened after that?"] {
        println!("\nQuery: {turn}");
        agent.prompt(turn).await?;
        let state = agent.state().await;
        println!("estimated context tokens: {}", state.estimated_context_tokens);
    }

    Ok(())
}
