//! Log Analyzer Agent Demo
//!
//! A read-only tool (`search_logs`) lets the model grep a log file for a
//! pattern and summarize what it finds, without the SDK ever loading the
//! whole file into the conversation itself.

use open_agent::{tool, Agent, AgentOptions, Error, OpenAiCompatProvider};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("LOG ANALYZER AGENT DEMO");
    println!("{}", "=".repeat(70));
    println!();

    let search_logs = tool("search_logs", "Search a log file for lines matching a substring")
        .param("path", "string")
        .param("pattern", "string")
        .build(|args| async move {
            let path = args["path"].as_str().unwrap_or_default();
            let pattern = args["pattern"].as_str().unwrap_or_default();

            let contents = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::tool(format!("reading '{path}': {e}")))?;

            let matches: Vec<&str> = contents
                .lines()
                .filter(|line| line.contains(pattern))
                .take(50)
                .collect();

            Ok(json!({"match_count": matches.len(), "matches": matches}))
        });

    let options = AgentOptions::builder()
        .system_prompt(
            "You are a log analysis assistant. Use search_logs to find relevant \
             entries, then summarize the errors you find in plain language.",
        )
        .model("qwen3:8b")
        .base_url("http://localhost:11434/v1")
        .tool(search_logs)
        .build()?;

    let provider = Arc::new(OpenAiCompatProvider::new(options.base_url()));
    let agent = Agent::new(options, provider)?;

    agent
        .prompt("Search /var/log/app.log for the word 'ERROR' and summarize what went wrong")
        .await?;

    for message in agent.history().await {
        println!("[{}] {}", message.role_tag(), message.text());
    }

    Ok(())
}
