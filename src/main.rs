use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use price_relay::{
    cg::CoinGeckoAPI, gateway::PriceGateway, mcp::McpServer, settings::Settings, web, NamedAPI,
};
use tokio::io::{stdin, stdout, BufReader};

#[derive(Parser)]
#[command(name = "price-relay", version, about = "Cryptocurrency price relay")]
struct Cli {
    /// Config file to read instead of ./price-relay.{toml,json}
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the JSON API over HTTP.
    Http {
        /// Overrides the configured port.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Serve the price tools over stdio.
    Mcp,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv::dotenv() {
        if !e.not_found() {
            return Err(e).context("Processing .env");
        }
    }
    env_logger::init();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Loading settings")?;
    let api = CoinGeckoAPI::from_settings(&settings).context("Building CoinGecko client")?;
    log::info!(
        "Starting price relay against {} at {}",
        api.get_name(),
        settings.api_base_url
    );
    let gateway = Arc::new(PriceGateway::new(api));

    match cli.command {
        Command::Http { port } => {
            if let Some(port) = port {
                settings.port = port;
            }
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Cannot listen for shutdown signal: {}", e);
                }
            };
            let (_, server) = web::bind(gateway, settings.bind_addr()?, shutdown)
                .context("Binding HTTP server")?;
            server.await;
            log::info!("HTTP server stopped");
        }
        Command::Mcp => {
            McpServer::new(gateway)
                .serve(BufReader::new(stdin()), stdout())
                .await
                .context("Serving tools over stdio")?;
        }
    }
    Ok(())
}
