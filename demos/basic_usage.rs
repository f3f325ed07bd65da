//! Basic usage example for adb-agent.

use adb_agent::{AgentConfig, ModelConfig, ParserMode, PhoneAgent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    // Any OpenAI-compatible endpoint serving a vision model works here
    let model_config = ModelConfig::default()
        .with_base_url("http://localhost:8000/v1")
        .with_model_name("autoglm-phone-9b")
        .with_stream(true);

    let agent_config = AgentConfig::default()
        .with_lang("en")
        .with_mode(ParserMode::Tools)
        .with_max_steps(50);

    // None for both callbacks keeps the console prompts
    let mut agent = PhoneAgent::new(model_config, agent_config, None, None);

    println!("🤖 Starting ADB Agent...\n");

    let task = "Open Settings and turn on Wi-Fi";
    println!("📝 Task: {}\n", task);

    match agent.run(task).await {
        Ok(result) => println!("\n✅ Task completed: {} ({} steps)", result, agent.step_count()),
        Err(e) => eprintln!("\n❌ Task failed: {}", e),
    }

    Ok(())
}
