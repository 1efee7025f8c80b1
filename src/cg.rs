use std::{collections::HashMap, time::Duration};

use crate::{
    settings::Settings, CoinMatch, GatewayError, MarketDataAPI, MarketSummary, NamedAPI,
    PriceQuote, Result,
};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize};

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
/// Largest page the markets endpoint serves.
pub const MAX_PER_PAGE: u32 = 250;

pub struct CoinGeckoAPI {
    client: Client,
    base_url: String,
    max_per_page: u32,
}

/// `{"bitcoin": {"usd": 67000.0}}`; quotes can be null for thin pairs.
type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

#[derive(Deserialize)]
struct MarketRow {
    id: String,
    name: String,
    symbol: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    price_change_percentage_24h: Option<f64>,
}

#[derive(Deserialize)]
struct SearchResponse {
    coins: Vec<SearchRow>,
}

#[derive(Deserialize)]
struct SearchRow {
    id: String,
    name: String,
    symbol: String,
    market_cap_rank: Option<u32>,
    #[serde(default)]
    thumb: String,
}
/*
{
  "coins": [
    {
      "id": "bitcoin",
      "name": "Bitcoin",
      "api_symbol": "bitcoin",
      "symbol": "BTC",
      "market_cap_rank": 1,
      "thumb": "https://coin-images.coingecko.com/coins/images/1/thumb/bitcoin.png",
      "large": "https://coin-images.coingecko.com/coins/images/1/large/bitcoin.png"
    },
*/

impl CoinGeckoAPI {
    pub fn build() -> anyhow::Result<Self> {
        Self::with_base_url(COINGECKO_API_URL, Duration::from_secs(10))
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(
            Self::with_base_url(&settings.api_base_url, settings.request_timeout())?
                .with_max_per_page(settings.max_per_page),
        )
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(Self {
            client: Client::builder()
                .default_headers(headers)
                .timeout(timeout)
                .build()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            max_per_page: MAX_PER_PAGE,
        })
    }

    pub fn with_max_per_page(mut self, max_per_page: u32) -> Self {
        self.max_per_page = max_per_page.max(1);
        self
    }

    async fn fetch<D: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<D> {
        info!("CoinGecko GET {} {:?}", path, query);
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamError {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }
        let body = res.text().await?;
        debug!("CoinGecko response {} bytes from {}", body.len(), path);
        decode(&body)
    }
}

fn decode<D: DeserializeOwned>(body: &str) -> Result<D> {
    serde_json::from_str(body).map_err(|e| GatewayError::Malformed(e.to_string()))
}

fn quote_for(coin: String, in_currency: &str, quotes: &HashMap<String, Option<f64>>) -> PriceQuote {
    let amount = quotes
        .get(in_currency)
        .or_else(|| quotes.get(&in_currency.to_lowercase()))
        .copied()
        .flatten();
    PriceQuote {
        coin,
        currency: in_currency.to_owned(),
        amount,
    }
}

#[async_trait]
impl MarketDataAPI for CoinGeckoAPI {
    async fn get_simple_price(
        &self,
        id_list: &[&str],
        in_currency: &str,
    ) -> Result<HashMap<String, PriceQuote>> {
        if id_list.is_empty() || id_list.iter().any(|id| id.is_empty()) {
            return Err(GatewayError::InvalidArgument(
                "At least one non-empty coin id is required".to_owned(),
            ));
        }
        if in_currency.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "Currency must not be empty".to_owned(),
            ));
        }
        let res: SimplePriceResponse = self
            .fetch(
                "/simple/price",
                &[
                    ("ids", id_list.join(",")),
                    ("vs_currencies", in_currency.to_owned()),
                ],
            )
            .await?;
        Ok(res
            .into_iter()
            .map(|(id, quotes)| {
                let quote = quote_for(id.clone(), in_currency, &quotes);
                (id, quote)
            })
            .collect())
    }

    async fn get_markets(
        &self,
        in_currency: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<MarketSummary>> {
        if per_page == 0 || page == 0 {
            return Err(GatewayError::InvalidArgument(
                "Limit and page must be positive integers".to_owned(),
            ));
        }
        if in_currency.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "Currency must not be empty".to_owned(),
            ));
        }
        let per_page = per_page.min(self.max_per_page);
        let rows: Vec<MarketRow> = self
            .fetch(
                "/coins/markets",
                &[
                    ("vs_currency", in_currency.to_owned()),
                    ("order", "market_cap_desc".to_owned()),
                    ("per_page", per_page.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| MarketSummary {
                id: row.id,
                name: row.name,
                symbol: row.symbol,
                current_price: row.current_price,
                market_cap: row.market_cap,
                price_change_percentage_24h: row.price_change_percentage_24h,
            })
            .collect())
    }

    async fn search_coins(&self, query: &str) -> Result<Vec<CoinMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "Search query must not be empty".to_owned(),
            ));
        }
        let res: SearchResponse = self.fetch("/search", &[("query", query.to_owned())]).await?;
        Ok(res
            .coins
            .into_iter()
            .map(|row| CoinMatch {
                id: row.id,
                name: row.name,
                symbol: row.symbol,
                market_cap_rank: row.market_cap_rank,
                thumb: row.thumb,
            })
            .collect())
    }
}

impl NamedAPI for CoinGeckoAPI {
    fn get_name(&self) -> String {
        "CoinGecko".to_owned()
    }
}
