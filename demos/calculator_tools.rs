//! Calculator Tools Demo
//!
//! Registers four arithmetic tools and lets the model call them. Dispatch,
//! validation, and re-prompting with the results all happen inside
//! `Agent::prompt` — the only thing this demo does is read the final
//! history back out.
//!
//! Usage:
//!   cargo run --example calculator_tools
//!
//! Requires:
//!   - Ollama running on localhost:11434
//!   - qwen3:8b model (or change the model below)

use open_agent::{tool, Agent, AgentOptions, Error, OpenAiCompatProvider};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("CALCULATOR TOOLS DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let add = tool("add", "Add two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            println!("  tool: add({a}, {b})");
            Ok(json!({"result": a + b}))
        });

    let multiply = tool("multiply", "Multiply two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            println!("  tool: multiply({a}, {b})");
            Ok(json!({"result": a * b}))
        });

    let subtract = tool("subtract", "Subtract two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            println!("  tool: subtract({a}, {b})");
            Ok(json!({"result": a - b}))
        });

    let divide = tool("divide", "Divide two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            if b == 0.0 {
                return Err(Error::tool("division by zero"));
            }
            println!("  tool: divide({a}, {b})");
            Ok(json!({"result": a / b}))
        });

    let options = AgentOptions::builder()
        .system_prompt("You are a calculator assistant. Use the provided tools for arithmetic.")
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .tool(add)
        .tool(multiply)
        .tool(subtract)
        .tool(divide)
        .max_tool_concurrency(2)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    for query in ["Calculate 15 + 27", "Calculate (10 + 5) * 3"] {
        println!("\nQuery: {query}");
        agent.prompt(query).await?;
        let history = agent.history().await;
        if let Some(last) = history.last() {
            println!("Answer: {}", last.text());
        }
    }

    Ok(())
}
