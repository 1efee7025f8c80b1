use log::info;

use crate::{
    GatewayError, MarketDataAPI, MarketSummary, NamedAPI, PriceQuote, Result, SearchHit,
    DEFAULT_CURRENCY,
};

/// Domain-level price operations shared by every transport.
///
/// Holds no state beyond the wrapped client: each call is an independent
/// round trip, so one gateway can serve any number of concurrent requests.
pub struct PriceGateway<T> {
    api: T,
}

impl<T> PriceGateway<T> {
    pub fn new(api: T) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &T {
        &self.api
    }
}

impl<T: MarketDataAPI> PriceGateway<T> {
    /// Quote one coin. A coin the provider does not know is `NotFound`; a
    /// known coin with no quote in `currency` is a success with no amount.
    pub async fn get_price(&self, coin: &str, currency: &str) -> Result<PriceQuote> {
        if coin.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "Cryptocurrency id must not be empty".to_owned(),
            ));
        }
        let currency = if currency.is_empty() {
            DEFAULT_CURRENCY
        } else {
            currency
        };
        let mut quotes = self.api.get_simple_price(&[coin], currency).await?;
        quotes
            .remove(coin)
            .ok_or_else(|| GatewayError::NotFound(format!("Cryptocurrency '{}' not found", coin)))
    }

    /// Top coins by market cap in USD, in provider order.
    pub async fn list_top(&self, limit: u32) -> Result<Vec<MarketSummary>> {
        if limit == 0 {
            return Err(GatewayError::InvalidArgument(
                "Limit must be a positive integer".to_owned(),
            ));
        }
        let mut coins = self.api.get_markets(DEFAULT_CURRENCY, limit, 1).await?;
        if coins.is_empty() {
            return Err(GatewayError::EmptyResult(
                "No cryptocurrency data available".to_owned(),
            ));
        }
        coins.truncate(limit as usize);
        Ok(coins)
    }

    /// Search by name or symbol, then price every hit with one batched USD
    /// lookup. Failure of the pricing lookup fails the whole search; ids the
    /// lookup does not return keep `price: None`.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Err(GatewayError::InvalidArgument(
                "Limit must be a positive integer".to_owned(),
            ));
        }
        let mut matches = self.api.search_coins(query).await?;
        matches.truncate(limit as usize);
        if matches.is_empty() {
            return Err(GatewayError::NotFound(format!(
                "No cryptocurrencies found matching '{}'",
                query
            )));
        }

        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        let quotes = self.api.get_simple_price(&ids, DEFAULT_CURRENCY).await?;
        info!(
            "Priced {} of {} search hits for '{}'",
            quotes.len(),
            matches.len(),
            query
        );
        Ok(matches
            .into_iter()
            .map(|coin| {
                let price = quotes.get(&coin.id).and_then(|q| q.amount);
                SearchHit::from_match(coin, price)
            })
            .collect())
    }
}

impl<T: NamedAPI> NamedAPI for PriceGateway<T> {
    fn get_name(&self) -> String {
        self.api.get_name()
    }
}
