//! Multi-Tool Agent Demo
//!
//! Registers several independent tools and raises `max_tool_concurrency` so
//! a single turn that calls more than one of them dispatches in parallel
//! rather than one at a time. Subscribes to the event bus to show the
//! overlap.

use open_agent::{tool, Agent, AgentOptions, Event, OpenAiCompatProvider};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn slow_lookup(label: &str, value: &str) -> serde_json::Value {
    tokio::time::sleep(Duration::from_millis(200)).await;
    json!({"label": label, "value": value})
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("MULTI-TOOL AGENT DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let weather = tool("get_weather", "Look up the current weather for a city")
        .param("city", "string")
        .build(|args| async move {
            let city = args["city"].as_str().unwrap_or_default().to_string();
            Ok(slow_lookup("weather", &city).await)
        });

    let population = tool("get_population", "Look up a city's population")
        .param("city", "string")
        .build(|args| async move {
            let city = args["city"].as_str().unwrap_or_default().to_string();
            Ok(slow_lookup("population", &city).await)
        });

    let timezone = tool("get_timezone", "Look up a city's timezone")
        .param("city", "string")
        .build(|args| async move {
            let city = args["city"].as_str().unwrap_or_default().to_string();
            Ok(slow_lookup("timezone", &city).await)
        });

    let options = AgentOptions::builder()
        .system_prompt(
            "You are a travel assistant. Look up weather, population, and \
             timezone for the requested city, then summarize them together.",
        )
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .tool(weather)
        .tool(population)
        .tool(timezone)
        .max_tool_concurrency(3)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    let _unsubscribe = agent.subscribe(|event| {
        if let Event::ToolStart { name, .. } = event {
            println!("  dispatching: {name}");
        }
        if let Event::ToolEnd { name, is_error, .. } = event {
            println!("  finished: {name} (error: {is_error})");
        }
    });

    agent.prompt("Tell me about Tokyo: weather, population, and timezone").await?;

    if let Some(answer) = agent.history().await.last() {
        println!("\nSummary: {}", answer.text());
    }

    Ok(())
}
