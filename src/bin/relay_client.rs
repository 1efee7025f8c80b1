//! Demo client: starts `price-relay mcp` as a child process and calls its
//! price tools over stdio.

use std::{path::PathBuf, process::Stdio};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{ChildStdin, ChildStdout, Command},
};

#[derive(Parser)]
#[command(name = "relay-client", about = "Calls the price-relay tools over stdio")]
struct Args {
    /// Path to the price-relay binary; defaults to the one next to this executable.
    #[arg(long)]
    server: Option<PathBuf>,

    /// Number of top coins to list.
    #[arg(long, default_value_t = 5)]
    limit: u32,
}

struct RpcClient {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl RpcClient {
    async fn send(&mut self, message: &Value) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await?;
        loop {
            let line = self
                .lines
                .next_line()
                .await?
                .context("Server closed its output")?;
            let reply: Value = serde_json::from_str(&line)
                .with_context(|| format!("Decoding server reply {}", line))?;
            if reply["id"] != json!(id) {
                log::debug!("Skipping unrelated message {}", line);
                continue;
            }
            if let Some(err) = reply.get("error") {
                bail!("{} failed: {}", method, err);
            }
            return Ok(reply["result"].clone());
        }
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<String> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        result["content"][0]["text"]
            .as_str()
            .map(str::to_owned)
            .with_context(|| format!("{} returned no text", name))
    }
}

fn default_server_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Locating current executable")?;
    let mut path = exe.with_file_name("price-relay");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let server = match args.server {
        Some(path) => path,
        None => default_server_path()?,
    };

    let mut child = Command::new(&server)
        .arg("mcp")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Starting {}", server.display()))?;
    let mut client = RpcClient {
        stdin: child.stdin.take().context("Child stdin unavailable")?,
        lines: BufReader::new(child.stdout.take().context("Child stdout unavailable")?).lines(),
        next_id: 0,
    };

    let init = client
        .request(
            "initialize",
            json!({
                "protocolVersion": price_relay::mcp::PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "crypto-price-client", "version": env!("CARGO_PKG_VERSION") }
            }),
        )
        .await?;
    client
        .send(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await?;
    println!(
        "Connected to {} server\n",
        init["serverInfo"]["name"].as_str().unwrap_or("unknown")
    );

    println!("Fetching Bitcoin price:");
    println!(
        "{}\n",
        client
            .call_tool("getCryptoPrice", json!({ "id": "bitcoin", "currency": "usd" }))
            .await?
    );

    println!("Fetching Ethereum price in EUR:");
    println!(
        "{}\n",
        client
            .call_tool("getCryptoPrice", json!({ "id": "ethereum", "currency": "eur" }))
            .await?
    );

    println!("Fetching top {} cryptocurrencies:", args.limit);
    println!(
        "{}",
        client
            .call_tool("listTopCryptos", json!({ "limit": args.limit }))
            .await?
    );

    drop(client);
    child.wait().await.context("Waiting for server to exit")?;
    println!("\nAll operations completed successfully");
    Ok(())
}
