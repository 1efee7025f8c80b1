#![allow(dead_code)]

use std::{collections::HashMap, convert::Infallible, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use price_relay::{
    cg::CoinGeckoAPI, CoinMatch, GatewayError, MarketDataAPI, MarketSummary, NamedAPI,
    PriceQuote, Result,
};
use warp::{http::StatusCode, path::FullPath, Filter};

/// In-memory upstream: canned answers plus a log of every call made.
pub struct FakeMarket {
    pub prices: std::result::Result<HashMap<String, HashMap<String, f64>>, GatewayError>,
    pub markets: std::result::Result<Vec<MarketSummary>, GatewayError>,
    pub matches: std::result::Result<Vec<CoinMatch>, GatewayError>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeMarket {
    fn default() -> Self {
        Self {
            prices: Ok(HashMap::new()),
            markets: Ok(vec![]),
            matches: Ok(vec![]),
            calls: Mutex::new(vec![]),
        }
    }
}

impl FakeMarket {
    pub fn with_price(mut self, id: &str, currency: &str, amount: f64) -> Self {
        if let Ok(prices) = &mut self.prices {
            prices
                .entry(id.to_owned())
                .or_default()
                .insert(currency.to_owned(), amount);
        }
        self
    }

    /// A coin the provider knows but has no quotes for.
    pub fn with_unquoted(mut self, id: &str) -> Self {
        if let Ok(prices) = &mut self.prices {
            prices.entry(id.to_owned()).or_default();
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MarketDataAPI for FakeMarket {
    async fn get_simple_price(
        &self,
        id_list: &[&str],
        in_currency: &str,
    ) -> Result<HashMap<String, PriceQuote>> {
        self.calls
            .lock()
            .push(format!("simple_price {} {}", id_list.join(","), in_currency));
        let prices = self.prices.clone()?;
        Ok(id_list
            .iter()
            .filter_map(|id| {
                prices.get(*id).map(|quotes| {
                    (
                        id.to_string(),
                        PriceQuote {
                            coin: id.to_string(),
                            currency: in_currency.to_owned(),
                            amount: quotes.get(in_currency).copied(),
                        },
                    )
                })
            })
            .collect())
    }

    async fn get_markets(
        &self,
        in_currency: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<MarketSummary>> {
        self.calls
            .lock()
            .push(format!("markets {} {} {}", in_currency, per_page, page));
        let mut markets = self.markets.clone()?;
        markets.truncate(per_page as usize);
        Ok(markets)
    }

    async fn search_coins(&self, query: &str) -> Result<Vec<CoinMatch>> {
        self.calls.lock().push(format!("search {}", query));
        self.matches.clone()
    }
}

impl NamedAPI for FakeMarket {
    fn get_name(&self) -> String {
        "Fake".to_owned()
    }
}

pub fn summary(id: &str, name: &str, symbol: &str, price: f64, market_cap: f64) -> MarketSummary {
    MarketSummary {
        id: id.to_owned(),
        name: name.to_owned(),
        symbol: symbol.to_owned(),
        current_price: Some(price),
        market_cap: Some(market_cap),
        price_change_percentage_24h: Some(1.5),
    }
}

pub fn top_five() -> Vec<MarketSummary> {
    vec![
        summary("bitcoin", "Bitcoin", "btc", 67000.0, 1.3e12),
        summary("ethereum", "Ethereum", "eth", 3500.0, 4.2e11),
        summary("tether", "Tether", "usdt", 1.0, 1.1e11),
        summary("binancecoin", "BNB", "bnb", 590.0, 8.7e10),
        summary("solana", "Solana", "sol", 150.0, 7.0e10),
    ]
}

pub fn coin_match(id: &str, name: &str, symbol: &str, rank: Option<u32>) -> CoinMatch {
    CoinMatch {
        id: id.to_owned(),
        name: name.to_owned(),
        symbol: symbol.to_owned(),
        market_cap_rank: rank,
        thumb: format!("https://example.test/{}/thumb.png", id),
    }
}

pub fn rate_limited() -> GatewayError {
    GatewayError::UpstreamError {
        status: 429,
        status_text: "Too Many Requests".to_owned(),
    }
}

/// A local HTTP server standing in for CoinGecko. Every request's path and
/// raw query string is recorded as `"{path}?{query}"`.
pub struct StubUpstream {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl StubUpstream {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

pub async fn stub_upstream(status: u16, body: &'static str) -> StubUpstream {
    stub_upstream_with_delay(status, body, Duration::from_millis(0)).await
}

pub async fn stub_upstream_with_delay(
    status: u16,
    body: &'static str,
    delay: Duration,
) -> StubUpstream {
    let requests = Arc::new(Mutex::new(vec![]));
    let log = requests.clone();
    let route = warp::path::full()
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .and_then(move |path: FullPath, query: String| {
            log.lock().push(format!("{}?{}", path.as_str(), query));
            async move {
                tokio::time::sleep(delay).await;
                Ok::<_, Infallible>(warp::reply::with_status(
                    body,
                    StatusCode::from_u16(status).unwrap(),
                ))
            }
        });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    StubUpstream {
        base_url: format!("http://{}/api/v3", addr),
        requests,
    }
}

/// A base URL nothing listens on.
pub fn closed_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api/v3", addr)
}

pub fn coingecko(base_url: &str) -> CoinGeckoAPI {
    let _ = env_logger::builder().is_test(true).try_init();
    CoinGeckoAPI::with_base_url(base_url, Duration::from_secs(5)).unwrap()
}
