// src/main.rs
// Prometheus - memory and runtime substrate for a self-improving meta-agent.

use clap::Parser;
use prometheus_core::cli::{run, Cli};
use prometheus_core::config::ResolvedConfig;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const KNOWN_PROVIDERS: &[&str] = &["openai", "deepseek"];

#[tokio::main]
async fn main() {
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".prometheus/.env"));
    }

    let level = match std::env::var("PROMETHEUS_LOG_LEVEL").as_deref() {
        Ok("error") => Level::ERROR,
        Ok("warn") => Level::WARN,
        Ok("debug") | Ok("trace") => Level::DEBUG,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cli = Cli::parse();
    let config = ResolvedConfig::load(KNOWN_PROVIDERS);

    let code = run(cli, config).await;
    std::process::exit(code);
}
