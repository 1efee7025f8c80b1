use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc};

use log::{info, warn};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use warp::{
    http::StatusCode,
    reject::{InvalidQuery, MethodNotAllowed, Reject},
    Filter, Rejection, Reply,
};

use crate::{
    gateway::PriceGateway, GatewayError, MarketDataAPI, MarketSummary, NamedAPI, SearchHit,
    DEFAULT_CURRENCY, DEFAULT_LIMIT,
};

pub const SERVER_NAME: &str = "CryptoPrice Web Server";

#[derive(Debug)]
struct ApiRejection(GatewayError);

impl Reject for ApiRejection {}

fn reject(err: GatewayError) -> Rejection {
    warp::reject::custom(ApiRejection(err))
}

#[derive(Deserialize)]
struct PriceParams {
    currency: Option<String>,
}

#[derive(Deserialize)]
struct TopParams {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct PriceBody {
    id: String,
    currency: String,
    price: Option<f64>,
    formatted: String,
}

#[derive(Serialize)]
struct TopCrypto {
    id: String,
    name: String,
    symbol: String,
    price: Option<f64>,
    market_cap: Option<f64>,
    price_change_24h: Option<f64>,
    formatted: String,
}

impl From<MarketSummary> for TopCrypto {
    fn from(coin: MarketSummary) -> Self {
        let formatted = coin.display();
        Self {
            symbol: coin.symbol.to_uppercase(),
            id: coin.id,
            name: coin.name,
            price: coin.current_price,
            market_cap: coin.market_cap,
            price_change_24h: coin.price_change_percentage_24h,
            formatted,
        }
    }
}

#[derive(Serialize)]
struct TopBody {
    cryptos: Vec<TopCrypto>,
    count: usize,
}

#[derive(Serialize)]
struct SearchResult {
    id: String,
    name: String,
    symbol: String,
    market_cap_rank: Option<u32>,
    price: Option<f64>,
    thumb: String,
    formatted: String,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        let formatted = hit.display();
        Self {
            symbol: hit.symbol.to_uppercase(),
            id: hit.id,
            name: hit.name,
            market_cap_rank: hit.market_cap_rank,
            price: hit.price,
            thumb: hit.thumb,
            formatted,
        }
    }
}

#[derive(Serialize)]
struct SearchBody {
    results: Vec<SearchResult>,
    count: usize,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    server: &'static str,
    version: &'static str,
    source: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn with_gateway<T: Send + Sync + 'static>(
    gateway: Arc<PriceGateway<T>>,
) -> impl Filter<Extract = (Arc<PriceGateway<T>>,), Error = Infallible> + Clone {
    warp::any().map(move || gateway.clone())
}

/// All `/api` routes, with errors rendered as `{"error": ...}` bodies.
pub fn routes<T>(
    gateway: Arc<PriceGateway<T>>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone
where
    T: MarketDataAPI + NamedAPI + 'static,
{
    let api = warp::get().and(warp::path("api"));

    let price = api
        .clone()
        .and(warp::path!("crypto" / String))
        .and(warp::query::<PriceParams>())
        .and(with_gateway(gateway.clone()))
        .and_then(get_crypto::<T>);

    let top = api
        .clone()
        .and(warp::path!("top-cryptos"))
        .and(warp::query::<TopParams>())
        .and(with_gateway(gateway.clone()))
        .and_then(get_top_cryptos::<T>);

    let search = api
        .clone()
        .and(warp::path!("search"))
        .and(warp::query::<SearchParams>())
        .and(with_gateway(gateway.clone()))
        .and_then(search_cryptos::<T>);

    let health = api
        .and(warp::path!("health"))
        .and(with_gateway(gateway))
        .map(|gateway: Arc<PriceGateway<T>>| health_check(gateway.get_name()));

    price
        .or(top)
        .or(search)
        .or(health)
        .recover(handle_rejection)
}

async fn get_crypto<T: MarketDataAPI>(
    id: String,
    params: PriceParams,
    gateway: Arc<PriceGateway<T>>,
) -> Result<impl Reply, Rejection> {
    // warp hands path segments over still percent-encoded.
    let id = percent_decode_str(&id).decode_utf8().map_err(|_| {
        reject(GatewayError::InvalidArgument(
            "Cryptocurrency id is not valid UTF-8".to_owned(),
        ))
    })?;
    let currency = params.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());
    let quote = gateway.get_price(&id, &currency).await.map_err(reject)?;
    Ok(warp::reply::json(&PriceBody {
        formatted: quote.display(),
        currency: quote.currency.to_uppercase(),
        id: quote.coin,
        price: quote.amount,
    }))
}

async fn get_top_cryptos<T: MarketDataAPI>(
    params: TopParams,
    gateway: Arc<PriceGateway<T>>,
) -> Result<impl Reply, Rejection> {
    let coins = gateway
        .list_top(params.limit.unwrap_or(DEFAULT_LIMIT))
        .await
        .map_err(reject)?;
    let cryptos: Vec<TopCrypto> = coins.into_iter().map(TopCrypto::from).collect();
    Ok(warp::reply::json(&TopBody {
        count: cryptos.len(),
        cryptos,
    }))
}

async fn search_cryptos<T: MarketDataAPI>(
    params: SearchParams,
    gateway: Arc<PriceGateway<T>>,
) -> Result<impl Reply, Rejection> {
    let query = params.query.unwrap_or_default();
    let hits = gateway
        .search(&query, params.limit.unwrap_or(DEFAULT_LIMIT))
        .await
        .map_err(reject)?;
    let results: Vec<SearchResult> = hits.into_iter().map(SearchResult::from).collect();
    Ok(warp::reply::json(&SearchBody {
        count: results.len(),
        results,
    }))
}

fn health_check(source: String) -> impl Reply {
    warp::reply::json(&HealthBody {
        status: "healthy",
        server: SERVER_NAME,
        version: env!("CARGO_PKG_VERSION"),
        source,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(ApiRejection(e)) = err.find::<ApiRejection>() {
        (
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_GATEWAY),
            e.to_string(),
        )
    } else if let Some(e) = err.find::<InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_owned())
    } else if err.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_owned(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled rejection: {:?}", err),
        )
    };
    warn!("Responding {} to API request: {}", status, message);
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}

/// Binds `addr` and returns the bound address plus the server future, which
/// completes once `shutdown` resolves.
pub fn bind<T>(
    gateway: Arc<PriceGateway<T>>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<(SocketAddr, impl Future<Output = ()>)>
where
    T: MarketDataAPI + NamedAPI + 'static,
{
    let (bound, server) =
        warp::serve(routes(gateway)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!("HTTP API listening on http://{}", bound);
    Ok((bound, server))
}
