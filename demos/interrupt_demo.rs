//! Interrupt Demo
//!
//! Demonstrates `Agent::abort()`: cancel a long-running turn from another
//! task and confirm the agent surfaces `Error::Aborted` rather than hanging
//! or silently continuing.

use open_agent::{Agent, AgentOptions, Error, OpenAiCompatProvider};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("INTERRUPT DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let options = AgentOptions::builder()
        .system_prompt("You are a helpful assistant. Be verbose in your responses.")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Arc::new(Agent::new(options, provider)?);

    let canceller = agent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        println!("\n(cancelling after 3 seconds)");
        canceller.abort();
    });

    println!("Query: Write a detailed 1000-word essay about quantum computing");
    match agent.prompt("Write a detailed 1000-word essay about quantum computing").await {
        Ok(()) => println!("completed before the cancellation fired"),
        Err(Error::Aborted) => {
            println!("run aborted");
            println!("messages preserved in history: {}", agent.history().await.len());
        }
        Err(e) => println!("run failed: {e}"),
    }

    Ok(())
}
