//! afkbot - Entry Point
//!
//! Loads settings, validates them before anything connects, then runs the
//! lifecycle loop with the operator console attached.

use afkbot::config::DEFAULT_CONFIG_PATH;
use afkbot::{console, Config, LifecycleManager, SimConnector};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let json_logs = args.iter().any(|a| a == "--json");
    let config_path = args
        .iter()
        .position(|a| a == "--config" || a == "-c")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    if help_mode {
        println!("afkbot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: afkbot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config, -c <path>  Settings file (default: {})", DEFAULT_CONFIG_PATH);
        println!("  --json               Log as JSON to stderr");
        println!("  --help, -h           Show this help");
        println!();
        println!("Console:");
        println!("  /<command>           Send a server command");
        println!("  !move <x> <y> <z>    Walk to a block");
        println!("  !stop | !pos | !shift | !jump | !slot <n>");
        println!("  !fish | !fish-beta | !join | !patrol");
        println!();
        println!("Environment variables:");
        println!("  AFKBOT_USERNAME        Account name");
        println!("  AFKBOT_PASSWORD        Account password");
        println!("  AFKBOT_AUTH_PASSWORD   Password for /register and /login");
        println!("  AFKBOT_SERVER_HOST     Server address");
        println!("  AFKBOT_SERVER_PORT     Server port");
        return Ok(());
    }

    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::load(&config_path)
        .with_context(|| format!("Invalid settings in {}", config_path))?;

    info!("afkbot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Connecting as {} to {}:{}",
        config.account.username, config.server.host, config.server.port
    );
    warn!("No network transport linked, using the simulated session");

    let manager = LifecycleManager::new(Arc::new(config), Arc::new(SimConnector::default()));
    let input = console::spawn_stdin_reader(64);

    tokio::select! {
        _ = manager.run(input) => info!("Bot stopped"),
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, shutting down");
            manager.scheduler().cancel_all();
        }
    }

    Ok(())
}
