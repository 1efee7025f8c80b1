mod common;

use common::{coin_match, rate_limited, top_five, FakeMarket};
use price_relay::{gateway::PriceGateway, GatewayError, PriceQuote};

fn gateway(market: FakeMarket) -> PriceGateway<FakeMarket> {
    let _ = env_logger::builder().is_test(true).try_init();
    PriceGateway::new(market)
}

#[tokio::test]
async fn price_passes_upstream_amount_through() {
    let gw = gateway(FakeMarket::default().with_price("bitcoin", "usd", 67000.0));
    let quote = gw.get_price("bitcoin", "usd").await.unwrap();
    assert_eq!(
        quote,
        PriceQuote {
            coin: "bitcoin".to_owned(),
            currency: "usd".to_owned(),
            amount: Some(67000.0),
        }
    );
}

#[tokio::test]
async fn unknown_coin_is_not_found() {
    let gw = gateway(FakeMarket::default());
    let err = gw.get_price("doesnotexist", "usd").await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn missing_currency_quote_is_success_without_amount() {
    let gw = gateway(FakeMarket::default().with_price("bitcoin", "usd", 67000.0));
    let quote = gw.get_price("bitcoin", "xyz").await.unwrap();
    assert_eq!(quote.amount, None);
    assert_eq!(quote.currency, "xyz");

    let gw = gateway(FakeMarket::default().with_unquoted("obscure-coin"));
    assert_eq!(gw.get_price("obscure-coin", "usd").await.unwrap().amount, None);
}

#[tokio::test]
async fn price_defaults_currency_and_keeps_case_upstream() {
    let gw = gateway(FakeMarket::default().with_price("bitcoin", "usd", 1.0));
    gw.get_price("bitcoin", "").await.unwrap();
    gw.get_price("bitcoin", "EUR").await.unwrap();
    assert_eq!(
        gw.api().calls(),
        ["simple_price bitcoin usd", "simple_price bitcoin EUR"]
    );
}

#[tokio::test]
async fn empty_coin_never_reaches_upstream() {
    let gw = gateway(FakeMarket::default());
    let err = gw.get_price("", "usd").await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));
    assert!(gw.api().calls().is_empty());
}

#[tokio::test]
async fn repeated_price_calls_are_identical() {
    let gw = gateway(FakeMarket::default().with_price("ethereum", "eur", 3210.5));
    let first = gw.get_price("ethereum", "eur").await.unwrap();
    let second = gw.get_price("ethereum", "eur").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(gw.api().calls().len(), 2);
}

#[tokio::test]
async fn upstream_status_propagates_unchanged() {
    let gw = gateway(FakeMarket {
        prices: Err(rate_limited()),
        ..FakeMarket::default()
    });
    let err = gw.get_price("bitcoin", "usd").await.unwrap_err();
    assert_eq!(err, rate_limited());
}

#[tokio::test]
async fn list_top_keeps_provider_order() {
    let gw = gateway(FakeMarket {
        markets: Ok(top_five()),
        ..FakeMarket::default()
    });
    let coins = gw.list_top(5).await.unwrap();
    let ids: Vec<&str> = coins.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["bitcoin", "ethereum", "tether", "binancecoin", "solana"]);
    assert_eq!(gw.api().calls(), ["markets usd 5 1"]);
}

#[tokio::test]
async fn list_top_never_exceeds_limit() {
    let gw = gateway(FakeMarket {
        markets: Ok(top_five()),
        ..FakeMarket::default()
    });
    assert_eq!(gw.list_top(3).await.unwrap().len(), 3);
    assert_eq!(gw.list_top(50).await.unwrap().len(), 5);
}

#[tokio::test]
async fn list_top_on_empty_upstream_is_empty_result() {
    let gw = gateway(FakeMarket::default());
    let err = gw.list_top(5).await.unwrap_err();
    assert!(matches!(err, GatewayError::EmptyResult(_)), "{:?}", err);
}

#[tokio::test]
async fn search_enriches_hits_in_one_batch() {
    let gw = gateway(FakeMarket {
        matches: Ok(vec![
            coin_match("bitcoin", "Bitcoin", "BTC", Some(1)),
            coin_match("bitcoin-cash", "Bitcoin Cash", "BCH", Some(20)),
            coin_match("wrapped-bitcoin", "Wrapped Bitcoin", "WBTC", None),
        ]),
        ..FakeMarket::default()
            .with_price("bitcoin", "usd", 67000.0)
            .with_price("bitcoin-cash", "usd", 480.0)
    });
    let hits = gw.search("bitcoin", 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].price, Some(67000.0));
    assert_eq!(hits[1].price, Some(480.0));
    assert_eq!(hits[2].price, None);
    assert_eq!(hits[2].market_cap_rank, None);
    assert_eq!(
        gw.api().calls(),
        [
            "search bitcoin",
            "simple_price bitcoin,bitcoin-cash,wrapped-bitcoin usd"
        ]
    );
}

#[tokio::test]
async fn search_truncates_before_enrichment() {
    let gw = gateway(FakeMarket {
        matches: Ok(vec![
            coin_match("a", "A", "A", Some(1)),
            coin_match("b", "B", "B", Some(2)),
            coin_match("c", "C", "C", Some(3)),
        ]),
        ..FakeMarket::default()
    });
    let hits = gw.search("x", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(gw.api().calls()[1], "simple_price a,b usd");
}

#[tokio::test]
async fn search_without_matches_is_not_found() {
    let gw = gateway(FakeMarket::default());
    let err = gw.search("zzzz", 10).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert_eq!(gw.api().calls(), ["search zzzz"]);
}

#[tokio::test]
async fn search_enrichment_failure_fails_the_search() {
    let gw = gateway(FakeMarket {
        matches: Ok(vec![coin_match("bitcoin", "Bitcoin", "BTC", Some(1))]),
        prices: Err(rate_limited()),
        ..FakeMarket::default()
    });
    let err = gw.search("bitcoin", 10).await.unwrap_err();
    assert_eq!(err, rate_limited());
}

#[tokio::test]
async fn list_top_with_zero_limit_is_rejected() {
    let gw = gateway(FakeMarket {
        markets: Ok(top_five()),
        ..FakeMarket::default()
    });
    let err = gw.list_top(0).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));
    assert!(gw.api().calls().is_empty());
}

#[tokio::test]
async fn search_with_zero_limit_is_rejected() {
    let gw = gateway(FakeMarket::default());
    let err = gw.search("bitcoin", 0).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));
    assert!(gw.api().calls().is_empty());
}
