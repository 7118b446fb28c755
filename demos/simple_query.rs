//! Simple Query Demo
//!
//! The smallest possible use of the SDK: build an agent, send one prompt,
//! print the final assistant text. No tools, no hooks, no session.
//!
//! Usage:
//!   cargo run --example simple_query
//!
//! Requires:
//!   - Ollama running on localhost:11434
//!   - qwen3:8b model (or change the model below)

use open_agent::{Agent, AgentOptions, OpenAiCompatProvider};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("SIMPLE QUERY DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let options = AgentOptions::builder()
        .system_prompt("You are a helpful assistant")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    println!("Query: What is the capital of France?");
    println!();

    agent.prompt("What is the capital of France?").await?;

    for message in agent.history().await {
        println!("[{}] {}", message.role_tag(), message.text());
    }

    Ok(())
}
