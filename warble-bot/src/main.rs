//! Warble bot — entry point.
//!
//! ```text
//! warble-bot                    Connect and serve commands
//! warble-bot --config <path>    Load a custom config TOML
//! warble-bot --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warble_bot::commands;
use warble_bot::config::BotConfig;
use warble_bot::http::RestClient;
use warble_bot::transport::WsTransport;
use warble_core::GatewayClient;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "warble-bot", about = "Warble gateway chat bot")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "warble.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&BotConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = BotConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("warble-bot v{}", env!("CARGO_PKG_VERSION"));
    info!("gateway: {}", config.gateway.uri);
    info!("command prefix: {:?}", config.bot.command_prefix);

    if config.gateway.auth_token.is_empty() {
        eprintln!("no auth token: set gateway.auth_token in the config or WARBLE_TOKEN in the environment");
        std::process::exit(1);
    }

    let transport = WsTransport::new();
    let http = Arc::new(RestClient::new()?);
    let mut client = GatewayClient::new(config.to_gateway_config(), transport, http);
    commands::register_builtins(client.commands(), Instant::now());

    tokio::select! {
        result = client.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received — shutting down");
        }
    }

    Ok(())
}
