//! Tool-calling façade: a line-delimited JSON-RPC 2.0 server speaking the
//! Model Context Protocol tool subset (`initialize`, `tools/list`,
//! `tools/call`, `ping`) over any async reader/writer pair, normally stdio.
//!
//! Gateway failures never surface as protocol errors. They come back as a
//! normal `tools/call` result flagged `isError` whose text explains the
//! failure.

use std::sync::Arc;

use itertools::join;
use log::{debug, error, info, warn};
use serde::{
    de::{DeserializeOwned, Error as _},
    Deserialize, Deserializer, Serialize,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{gateway::PriceGateway, GatewayError, MarketDataAPI, DEFAULT_CURRENCY, DEFAULT_LIMIT};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "CryptoPrice";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Request body minus `id`, which is read from the raw message so that an
/// explicit `null` id can be told apart from a notification.
#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct PriceArgs {
    id: String,
    #[serde(default = "default_currency")]
    currency: String,
}

#[derive(Deserialize)]
struct TopArgs {
    #[serde(default = "default_limit", deserialize_with = "whole_number")]
    limit: u32,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_limit", deserialize_with = "whole_number")]
    limit: u32,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_owned()
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// Accepts any JSON number with no fractional part, so `5` and `5.0` agree.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let n = f64::deserialize(deserializer)?;
    if n.fract() == 0.0 && n >= 0.0 && n <= f64::from(u32::MAX) {
        Ok(n as u32)
    } else {
        Err(D::Error::custom(format!(
            "expected a whole number, got {}",
            n
        )))
    }
}

fn parse_args<A: DeserializeOwned>(arguments: Value) -> Result<A, GatewayError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| GatewayError::InvalidArgument(format!("Invalid arguments: {}", e)))
}

/// The one place a gateway error becomes tool-result text.
fn tool_error_text(action: &str, err: &GatewayError) -> String {
    match err {
        GatewayError::UpstreamError { .. } => err.to_string(),
        GatewayError::InvalidArgument(_)
        | GatewayError::NotFound(_)
        | GatewayError::EmptyResult(_) => format!("{}.", err),
        GatewayError::UpstreamUnreachable { .. } | GatewayError::Malformed(_) => {
            format!("Error {}: {}", action, err)
        }
    }
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": "getCryptoPrice",
            "description": "Get the current price of a cryptocurrency",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Cryptocurrency ID (e.g., bitcoin, ethereum)"
                    },
                    "currency": {
                        "type": "string",
                        "default": DEFAULT_CURRENCY,
                        "description": "Currency to display the price in (e.g., usd, eur)"
                    }
                },
                "required": ["id"]
            }
        },
        {
            "name": "listTopCryptos",
            "description": "List the top cryptocurrencies by market capitalization",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "default": DEFAULT_LIMIT,
                        "description": "Number of top cryptocurrencies to return"
                    }
                }
            }
        },
        {
            "name": "searchCryptos",
            "description": "Search cryptocurrencies by name or symbol, with USD prices",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Name or symbol to search for"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "default": DEFAULT_LIMIT,
                        "description": "Maximum number of matches to return"
                    }
                },
                "required": ["query"]
            }
        }
    ])
}

fn encode(response: &RpcResponse) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(reply) => Some(reply),
        Err(e) => {
            error!("Cannot serialize JSON-RPC reply: {}", e);
            None
        }
    }
}

pub struct McpServer<T> {
    gateway: Arc<PriceGateway<T>>,
}

impl<T: MarketDataAPI> McpServer<T> {
    pub fn new(gateway: Arc<PriceGateway<T>>) -> Self {
        Self { gateway }
    }

    /// Serves requests until `reader` hits EOF. Requests are answered in
    /// arrival order, one reply line per request; notifications get none.
    /// A line that is not UTF-8 is answered with a parse error; only I/O
    /// failures end the loop.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("{} tool server ready", SERVER_NAME);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let reply = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim()).await,
                Err(e) => {
                    warn!("Request line is not valid UTF-8: {}", e);
                    encode(&RpcResponse::error(
                        Value::Null,
                        RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                    ))
                }
            };
            if let Some(reply) = reply {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        info!("Input closed, stopping {} tool server", SERVER_NAME);
        Ok(())
    }

    /// Handles one JSON-RPC message, returning the serialized reply if one is due.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(line) {
            Err(e) => RpcResponse::error(
                Value::Null,
                RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
            ),
            Ok(message) => self.handle_message(message).await?,
        };
        encode(&response)
    }

    async fn handle_message(&self, message: Value) -> Option<RpcResponse> {
        // Only an absent id marks a notification; `"id": null` is still answered.
        let id = match message.get("id") {
            Some(id) => id.clone(),
            None if message.is_object() => {
                debug!(
                    "Notification {}",
                    message.get("method").and_then(Value::as_str).unwrap_or("?")
                );
                return None;
            }
            None => {
                return Some(RpcResponse::error(
                    Value::Null,
                    RpcError::new(INVALID_REQUEST, "Invalid request: expected an object"),
                ))
            }
        };
        let request: RpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return Some(RpcResponse::error(
                    id,
                    RpcError::new(INVALID_REQUEST, format!("Invalid request: {}", e)),
                ))
            }
        };
        if request.jsonrpc.as_deref() != Some("2.0") {
            return Some(RpcResponse::error(
                id,
                RpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            ));
        }
        Some(match self.dispatch(&request.method, request.params).await {
            Ok(result) => RpcResponse::result(id, result),
            Err(err) => RpcResponse::error(id, err),
        })
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.call_tool(params).await,
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    async fn call_tool(&self, params: Value) -> Result<Value, RpcError> {
        let call: CallParams = serde_json::from_value(params)
            .map_err(|e| RpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))?;
        info!("Tool call {}", call.name);
        let (action, outcome) = match call.name.as_str() {
            "getCryptoPrice" => ("fetching price", self.crypto_price(call.arguments).await),
            "listTopCryptos" => (
                "fetching top cryptocurrencies",
                self.top_cryptos(call.arguments).await,
            ),
            "searchCryptos" => (
                "searching cryptocurrencies",
                self.search_cryptos(call.arguments).await,
            ),
            other => {
                return Err(RpcError::new(
                    INVALID_PARAMS,
                    format!("Unknown tool: {}", other),
                ))
            }
        };
        let (text, is_error) = match outcome {
            Ok(text) => (text, false),
            Err(err) => {
                warn!("Tool {} failed: {}", call.name, err);
                (tool_error_text(action, &err), true)
            }
        };
        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }))
    }

    async fn crypto_price(&self, arguments: Value) -> Result<String, GatewayError> {
        let args: PriceArgs = parse_args(arguments)?;
        let quote = self.gateway.get_price(&args.id, &args.currency).await?;
        Ok(quote.display())
    }

    async fn top_cryptos(&self, arguments: Value) -> Result<String, GatewayError> {
        let args: TopArgs = parse_args(arguments)?;
        let coins = self.gateway.list_top(args.limit).await?;
        Ok(join(coins.iter().map(|c| c.display()), "\n"))
    }

    async fn search_cryptos(&self, arguments: Value) -> Result<String, GatewayError> {
        let args: SearchArgs = parse_args(arguments)?;
        let hits = self.gateway.search(&args.query, args.limit).await?;
        Ok(join(hits.iter().map(|h| h.display()), "\n"))
    }
}
