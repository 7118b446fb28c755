//! Auto-Execution Demo
//!
//! Every `Agent::prompt` call already auto-executes tool calls and loops
//! until the model stops asking for work — there's no separate "manual
//! mode" to opt out of. This demo shows that behavior end to end: each
//! query below may take several tool calls internally, and the caller only
//! ever sees the final assistant text.

use open_agent::{tool, Agent, AgentOptions, OpenAiCompatProvider};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("AUTO-EXECUTION DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let add = tool("add", "Add two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            println!("  tool: add({a}, {b}) = {}", a + b);
            Ok(json!({"result": a + b}))
        });

    let multiply = tool("multiply", "Multiply two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            println!("  tool: multiply({a}, {b}) = {}", a * b);
            Ok(json!({"result": a * b}))
        });

    let options = AgentOptions::builder()
        .system_prompt(
            "You are a calculator assistant. Use the provided tools and show your work step by step.",
        )
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .tool(add)
        .tool(multiply)
        .max_turns(10)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    for query in ["Calculate (20 - 8) * 3 + 15", "Calculate (10 + 5) * 3"] {
        println!("\nQuery: {query}");
        agent.prompt(query).await?;
        if let Some(answer) = agent.history().await.last() {
            println!("Answer: {}", answer.text());
        }
    }

    println!("\ntotal messages in history: {}", agent.history().await.len());

    Ok(())
}
