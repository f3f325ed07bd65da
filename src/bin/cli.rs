//! ADB Agent - LLM-driven Android phone automation
//!
//! This is the CLI entry point for the adb-agent tool.
//! Run with: cargo run --bin adb-agent -- "Open Settings"

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use adb_agent::adb::{ADBConnection, DEFAULT_TCPIP_PORT};
use adb_agent::config::supported_apps;
use adb_agent::preflight::{check_model_api, check_system_requirements};
use adb_agent::{
    AdbDevice, AgentConfig, AgentError, AppSettings, ModelClient, ModelConfig, ParserMode,
    PhoneAgent,
};
use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "adb-agent",
    version,
    about = "Drive an Android device over ADB with a vision-language model"
)]
struct Cli {
    /// Task to run; interactive mode when omitted
    task: Vec<String>,

    /// Model API base URL
    #[arg(long, env = "PHONE_AGENT_BASE_URL")]
    base_url: Option<String>,
    /// Model name
    #[arg(long, env = "PHONE_AGENT_MODEL")]
    model: Option<String>,
    /// Model API key
    #[arg(long, env = "PHONE_AGENT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Maximum steps per task
    #[arg(long, env = "PHONE_AGENT_MAX_STEPS")]
    max_steps: Option<u32>,
    /// ADB device ID
    #[arg(short, long, env = "PHONE_AGENT_DEVICE_ID")]
    device_id: Option<String>,
    /// Prompt and message language
    #[arg(long, env = "PHONE_AGENT_LANG", value_parser = ["cn", "en"])]
    lang: Option<String>,
    /// Action encoding: dsl or tools
    #[arg(long, env = "PHONE_AGENT_MODE")]
    mode: Option<ParserMode>,
    /// Stream model output
    #[arg(long, env = "PHONE_AGENT_STREAM", num_args = 0..=1, default_missing_value = "true")]
    stream: Option<bool>,
    #[arg(long, env = "PHONE_AGENT_MAX_TOKENS")]
    max_tokens: Option<u32>,
    #[arg(long, env = "PHONE_AGENT_TEMPERATURE")]
    temperature: Option<f32>,
    #[arg(long, env = "PHONE_AGENT_TOP_P")]
    top_p: Option<f32>,
    #[arg(long, env = "PHONE_AGENT_FREQUENCY_PENALTY")]
    frequency_penalty: Option<f32>,

    /// Path to the adb executable
    #[arg(long, default_value = "adb")]
    adb_path: String,

    /// Connect to a remote device (host[:port])
    #[arg(long, value_name = "ADDRESS")]
    connect: Option<String>,
    /// Disconnect a remote device, or all of them
    #[arg(long, value_name = "ADDRESS", num_args = 0..=1, default_missing_value = "all")]
    disconnect: Option<String>,
    /// List connected devices
    #[arg(long, action = ArgAction::SetTrue)]
    list_devices: bool,
    /// Enable TCP/IP debugging on a USB device
    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = "5555")]
    enable_tcpip: Option<u16>,
    /// Print the device's Wi-Fi IP address
    #[arg(long, action = ArgAction::SetTrue)]
    device_ip: bool,
    /// Restart the adb server
    #[arg(long, action = ArgAction::SetTrue)]
    restart_server: bool,

    /// List supported app names
    #[arg(long, action = ArgAction::SetTrue)]
    list_apps: bool,
    /// Persist the resolved settings and exit
    #[arg(long, action = ArgAction::SetTrue)]
    save_settings: bool,
    /// Skip the adb and model API checks
    #[arg(long, action = ArgAction::SetTrue)]
    skip_checks: bool,
    /// Only print results
    #[arg(short, long, action = ArgAction::SetTrue)]
    quiet: bool,
}

impl Cli {
    /// Command-line and environment values layered over the saved settings.
    fn resolve_settings(&self) -> AppSettings {
        let mut settings = AppSettings::load();
        if let Some(v) = &self.base_url {
            settings.base_url = v.clone();
        }
        if let Some(v) = &self.model {
            settings.model_name = v.clone();
        }
        if let Some(v) = &self.api_key {
            settings.api_key = v.clone();
        }
        if let Some(v) = self.max_steps {
            settings.max_steps = v;
        }
        if let Some(v) = &self.device_id {
            settings.device_id = v.clone();
        }
        if let Some(v) = &self.lang {
            settings.lang = v.clone();
        }
        if let Some(v) = self.mode {
            settings.mode = v;
        }
        if let Some(v) = self.stream {
            settings.stream = v;
        }
        if let Some(v) = self.max_tokens {
            settings.max_tokens = v;
        }
        if let Some(v) = self.temperature {
            settings.temperature = v;
        }
        if let Some(v) = self.top_p {
            settings.top_p = v;
        }
        if let Some(v) = self.frequency_penalty {
            settings.frequency_penalty = v;
        }
        settings
    }

    fn has_device_command(&self) -> bool {
        self.connect.is_some()
            || self.disconnect.is_some()
            || self.list_devices
            || self.enable_tcpip.is_some()
            || self.device_ip
            || self.restart_server
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list_apps {
        println!("Supported apps:");
        for app in supported_apps() {
            println!("  - {}", app);
        }
        return Ok(());
    }

    let settings = cli.resolve_settings();

    if cli.save_settings {
        match settings.save() {
            Ok(path) => println!("✓ Settings saved to {}", path.display()),
            Err(e) => bail!(e),
        }
        return Ok(());
    }

    let device_id = Some(settings.device_id.as_str()).filter(|id| !id.is_empty());

    if cli.has_device_command() {
        return handle_device_commands(&cli, device_id);
    }

    let model_config = settings.model_config().with_verbose(!cli.quiet);
    let mut agent_config = settings.agent_config();
    if cli.quiet {
        agent_config = agent_config.quiet();
    }

    if !cli.skip_checks {
        if !check_system_requirements(&cli.adb_path, device_id) {
            std::process::exit(1);
        }
        if !check_model_api(&model_config).await {
            std::process::exit(1);
        }
    }

    print_configuration(&model_config, &agent_config);

    let device = AdbDevice::new().with_adb_path(&cli.adb_path);
    let mut agent = PhoneAgent::from_parts(
        Box::new(ModelClient::new(model_config)),
        Arc::new(device),
        agent_config,
        None,
        None,
    );

    let cancel = agent.cancel_flag();
    install_ctrl_c_handler(cancel.clone());

    if !cli.task.is_empty() {
        let task = cli.task.join(" ");
        println!("\n📝 Task: {}\n", task);
        run_task(&mut agent, &task).await;
        return Ok(());
    }

    // Interactive mode
    println!("\nEntering interactive mode. Type 'quit' to exit.");
    let stdin = io::stdin();
    loop {
        print!("\n📝 Enter your task: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!("\nGoodbye! 👋");
            break;
        }
        let task = line.trim();

        if task.is_empty() {
            continue;
        }

        if matches!(task.to_lowercase().as_str(), "quit" | "exit" | "q") {
            println!("Goodbye! 👋");
            break;
        }

        cancel.store(false, Ordering::SeqCst);
        run_task(&mut agent, task).await;
    }

    Ok(())
}

async fn run_task(agent: &mut PhoneAgent, task: &str) {
    match agent.run(task).await {
        Ok(result) => println!("\n✅ Result: {}", result),
        Err(AgentError::Cancelled) => println!("\n⏹️  Task cancelled"),
        Err(e) => eprintln!("\n❌ Error: {}", e),
    }
}

/// First Ctrl-C stops the task after the current step; a second one exits.
fn install_ctrl_c_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancel.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            eprintln!("\n⏹️  Stopping after the current step (Ctrl-C again to quit)");
        }
    });
}

fn handle_device_commands(cli: &Cli, device_id: Option<&str>) -> Result<()> {
    let conn = ADBConnection::with_path(&cli.adb_path);

    if cli.restart_server {
        conn.restart_server()?;
        println!("✓ ADB server restarted");
    }

    if let Some(address) = &cli.connect {
        println!("Connecting to {}...", address);
        match conn.connect(address) {
            Ok(message) => println!("✓ {}", message),
            Err(e) => println!("✗ {}", e),
        }
    }

    if let Some(address) = &cli.disconnect {
        let target = (address != "all").then_some(address.as_str());
        match target {
            Some(address) => println!("Disconnecting from {}...", address),
            None => println!("Disconnecting all remote devices..."),
        }
        match conn.disconnect(target) {
            Ok(message) => println!("✓ {}", message.trim()),
            Err(e) => println!("✗ {}", e),
        }
    }

    if let Some(port) = cli.enable_tcpip {
        println!("Enabling TCP/IP debugging on port {}...", port);
        match conn.enable_tcpip(port, device_id) {
            Ok(message) => {
                println!("✓ {}", message.trim());
                if let Ok(ip) = conn.get_device_ip(device_id) {
                    println!("  Connect with: adb-agent --connect {}:{}", ip, port);
                }
            }
            Err(e) => println!("✗ {}", e),
        }
    }

    if cli.device_ip {
        match conn.get_device_ip(device_id) {
            Ok(ip) => println!("✓ Device IP: {}", ip),
            Err(e) => println!("✗ {}", e),
        }
    }

    if cli.list_devices {
        let devices = conn.list_devices()?;
        if devices.is_empty() {
            println!("No devices connected.");
        } else {
            println!("Connected devices:");
            println!("{}", "-".repeat(60));
            for device in devices {
                let icon = if device.is_ready() { "✓" } else { "✗" };
                let model = device
                    .model
                    .as_deref()
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default();
                println!(
                    "  {} {:<30} [{}]{}",
                    icon,
                    device.device_id,
                    device.connection_type.as_str(),
                    model
                );
            }
        }
    }

    Ok(())
}

fn print_configuration(model_config: &ModelConfig, agent_config: &AgentConfig) {
    println!("{}", "=".repeat(50));
    println!("🤖 ADB Agent - AI-powered Android automation");
    println!("{}", "=".repeat(50));
    println!("Model: {} @ {}", model_config.model_name, model_config.base_url);
    println!("Mode: {}", agent_config.mode);
    println!("Max Steps: {}", agent_config.max_steps);
    println!("Language: {}", agent_config.lang);
    println!(
        "Retry: max {} attempts, {}s delay",
        model_config.max_retries, model_config.retry_delay_secs
    );
    match &agent_config.device_id {
        Some(id) => println!("Device: {}", id),
        None => println!("Device: (auto-detected)"),
    }
    println!("{}", "=".repeat(50));
}
