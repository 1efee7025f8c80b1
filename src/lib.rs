pub mod cg;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod settings;
pub mod web;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

pub use error::{GatewayError, Result};

/// Currency used when the caller does not name one.
pub const DEFAULT_CURRENCY: &str = "usd";
/// Result count used when the caller does not pass a limit.
pub const DEFAULT_LIMIT: u32 = 10;

/// Raw access to an upstream price-data provider.
///
/// Implementations issue exactly one upstream request per call and classify
/// its outcome into a [`GatewayError`]; they never retry or cache.
#[async_trait]
pub trait MarketDataAPI: Send + Sync {
    /// Quotes for every id the provider knows, keyed by id. Unknown ids are
    /// missing from the map; a known id without a quote in `in_currency`
    /// carries `amount: None`.
    async fn get_simple_price(
        &self,
        id_list: &[&str],
        in_currency: &str,
    ) -> Result<HashMap<String, PriceQuote>>;

    /// One page of coins ordered by market cap, descending.
    async fn get_markets(
        &self,
        in_currency: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<MarketSummary>>;

    async fn search_coins(&self, query: &str) -> Result<Vec<CoinMatch>>;
}

pub trait NamedAPI {
    fn get_name(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub coin: String,
    pub currency: String,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummary {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
}

/// A search candidate before price enrichment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinMatch {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub thumb: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub price: Option<f64>,
    pub thumb: String,
}

impl SearchHit {
    pub fn from_match(coin: CoinMatch, price: Option<f64>) -> Self {
        Self {
            id: coin.id,
            name: coin.name,
            symbol: coin.symbol,
            market_cap_rank: coin.market_cap_rank,
            price,
            thumb: coin.thumb,
        }
    }
}

/// Renders a quote amount the way both transports print it.
pub fn format_amount(amount: Option<f64>) -> String {
    amount.map_or_else(|| "N/A".to_owned(), |v| v.to_string())
}

impl PriceQuote {
    /// `bitcoin: 67000 USD`
    pub fn display(&self) -> String {
        format!(
            "{}: {} {}",
            self.coin,
            format_amount(self.amount),
            self.currency.to_uppercase()
        )
    }
}

impl MarketSummary {
    /// `Bitcoin (BTC): $67000`
    pub fn display(&self) -> String {
        format!(
            "{} ({}): ${}",
            self.name,
            self.symbol.to_uppercase(),
            format_amount(self.current_price)
        )
    }
}

impl SearchHit {
    /// `Bitcoin (BTC) #1: $67000`
    pub fn display(&self) -> String {
        match self.market_cap_rank {
            Some(rank) => format!(
                "{} ({}) #{}: ${}",
                self.name,
                self.symbol.to_uppercase(),
                rank,
                format_amount(self.price)
            ),
            None => format!(
                "{} ({}): ${}",
                self.name,
                self.symbol.to_uppercase(),
                format_amount(self.price)
            ),
        }
    }
}
