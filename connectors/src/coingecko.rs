use crate::{rate_limit::RateLimiter, MarketDataProvider};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::{
    models::{
        normalize, CoinId, MarketSnapshot, PriceChange, PriceHistory, PriceHistoryPoint,
        TrendingCoin,
    },
    Error, Result,
};
use reqwest::{header::RETRY_AFTER, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
pub const MAX_HISTORY_DAYS: u32 = 365;

/// Settings for the CoinGecko gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Optional demo/pro API key
    pub api_key: Option<String>,
    /// Bound for regular lookups
    pub timeout: Duration,
    /// Bound for existence checks, kept short since they gate user writes
    pub verify_timeout: Duration,
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: COINGECKO_API_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
            verify_timeout: Duration::from_secs(5),
            user_agent: "CoinSight/1.0".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            base_url: std::env::var("COINGECKO_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("COINGECKO_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            timeout: secs("COINGECKO_TIMEOUT_SECS", defaults.timeout),
            verify_timeout: secs("COINGECKO_VERIFY_TIMEOUT_SECS", defaults.verify_timeout),
            user_agent: defaults.user_agent,
        }
    }
}

/// Gateway to the CoinGecko v3 API.
///
/// Every request is admitted by the shared [`RateLimiter`] first; a local
/// rejection returns `Error::LocalRateLimited` without touching the network.
pub struct CoinGeckoConnector {
    client: reqwest::Client,
    config: GatewayConfig,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoMarket {
    id: String,
    symbol: String,
    name: String,
    image: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_1h_in_currency: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
    price_change_percentage_30d_in_currency: Option<f64>,
    circulating_supply: Option<f64>,
    total_supply: Option<f64>,
    max_supply: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoImage {
    large: Option<String>,
    small: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoDescription {
    en: Option<String>,
}

/// Per-currency value maps, e.g. `{"usd": 50000.0, "eur": ...}`
type CurrencyMap = HashMap<String, Option<f64>>;

fn usd(map: &CurrencyMap) -> Option<f64> {
    map.get("usd").copied().flatten()
}

#[derive(Debug, Deserialize)]
struct CoinGeckoMarketData {
    #[serde(default)]
    current_price: CurrencyMap,
    #[serde(default)]
    market_cap: CurrencyMap,
    #[serde(default)]
    total_volume: CurrencyMap,
    #[serde(default)]
    price_change_percentage_1h_in_currency: CurrencyMap,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_7d: Option<f64>,
    price_change_percentage_30d: Option<f64>,
    circulating_supply: Option<f64>,
    total_supply: Option<f64>,
    max_supply: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoDetail {
    id: String,
    symbol: String,
    name: String,
    image: Option<CoinGeckoImage>,
    description: Option<CoinGeckoDescription>,
    market_cap_rank: Option<u32>,
    market_data: Option<CoinGeckoMarketData>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoMarketChart {
    /// `[unix_millis, price]` pairs
    prices: Vec<(f64, f64)>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoTrending {
    coins: Vec<CoinGeckoTrendingEntry>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoTrendingEntry {
    item: CoinGeckoTrendingItem,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoTrendingItem {
    id: String,
    name: String,
    symbol: String,
    market_cap_rank: Option<u32>,
    thumb: Option<String>,
    score: Option<u32>,
}

impl CoinGeckoMarket {
    fn into_snapshot(self) -> Option<MarketSnapshot> {
        let price = match self.current_price {
            Some(price) => price,
            None => {
                debug!("Skipping {} with no current price", self.id);
                return None;
            }
        };

        Some(MarketSnapshot {
            id: CoinId::from_provider(&self.id),
            name: self.name,
            symbol: self.symbol,
            image_url: self.image,
            description: None,
            current_price_usd: price,
            market_cap_usd: self.market_cap,
            volume_24h_usd: self.total_volume,
            price_change_pct: PriceChange {
                h1: self.price_change_percentage_1h_in_currency,
                h24: self.price_change_percentage_24h,
                d7: self.price_change_percentage_7d_in_currency,
                d30: self.price_change_percentage_30d_in_currency,
            },
            circulating_supply: self.circulating_supply,
            total_supply: self.total_supply,
            max_supply: self.max_supply,
            market_cap_rank: self.market_cap_rank,
            last_updated: self.last_updated,
        })
    }
}

impl TryFrom<CoinGeckoDetail> for MarketSnapshot {
    type Error = Error;

    fn try_from(detail: CoinGeckoDetail) -> Result<Self> {
        let data = detail.market_data.ok_or_else(|| {
            Error::UpstreamMalformed(format!("coin '{}' has no market_data", detail.id))
        })?;
        let price = usd(&data.current_price).ok_or_else(|| {
            Error::UpstreamMalformed(format!("coin '{}' has no USD price", detail.id))
        })?;

        Ok(MarketSnapshot {
            id: CoinId::from_provider(&detail.id),
            name: detail.name,
            symbol: detail.symbol,
            image_url: detail.image.and_then(|image| image.large.or(image.small)),
            description: detail
                .description
                .and_then(|d| d.en)
                .filter(|text| !text.trim().is_empty()),
            current_price_usd: price,
            market_cap_usd: usd(&data.market_cap),
            volume_24h_usd: usd(&data.total_volume),
            price_change_pct: PriceChange {
                h1: usd(&data.price_change_percentage_1h_in_currency),
                h24: data.price_change_percentage_24h,
                d7: data.price_change_percentage_7d,
                d30: data.price_change_percentage_30d,
            },
            circulating_supply: data.circulating_supply,
            total_supply: data.total_supply,
            max_supply: data.max_supply,
            market_cap_rank: detail.market_cap_rank,
            last_updated: data.last_updated.or(detail.last_updated),
        })
    }
}

fn parse<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::UpstreamMalformed(format!("Failed to parse CoinGecko {}: {}", what, e)))
}

impl CoinGeckoConnector {
    pub fn new(config: GatewayConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Admit, send, and map the upstream status to the local error taxonomy.
    /// `requested` identifies the coin for 404 mapping on per-coin endpoints.
    async fn get_json(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        timeout: Duration,
        requested: Option<(&str, &CoinId)>,
    ) -> Result<Value> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        self.limiter.check()?;

        debug!("Fetching from CoinGecko: {}", url);

        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .timeout(timeout);
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!("CoinGecko rate limited {}, retry after {}s", path, retry_after);
            return Err(Error::UpstreamRateLimited { retry_after });
        }

        if status == StatusCode::NOT_FOUND {
            if let Some((raw, normalized)) = requested {
                debug!("CoinGecko has no coin '{}'", normalized);
                return Err(Error::CoinNotFound {
                    requested_id: raw.to_string(),
                    suggested_id: normalized.to_string(),
                });
            }
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("CoinGecko API error: {} - {}", status, body);
            return Err(Error::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&text).map_err(|e| {
            Error::UpstreamMalformed(format!("CoinGecko returned invalid JSON: {}", e))
        })
    }

    /// Base URL plus `segments`, each appended as one escaped path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.base_url).map_err(|e| {
            Error::ConfigError(format!("Invalid CoinGecko base URL '{}': {}", self.config.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::ConfigError(format!("CoinGecko base URL '{}' cannot take a path", self.config.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn detail(&self, raw_id: &str, timeout: Duration) -> Result<MarketSnapshot> {
        let coin_id = well_formed(raw_id)?;

        let query = [
            ("localization", "false".to_string()),
            ("tickers", "false".to_string()),
            ("market_data", "true".to_string()),
            ("community_data", "false".to_string()),
            ("developer_data", "false".to_string()),
        ];

        let value = self
            .get_json(&["coins", coin_id.as_str()], &query, timeout, Some((raw_id, &coin_id)))
            .await?;
        if !value.is_object() {
            return Err(Error::UpstreamMalformed(format!(
                "expected an object for coin '{}'",
                coin_id
            )));
        }

        let detail: CoinGeckoDetail = parse(value, "coin detail")?;
        MarketSnapshot::try_from(detail)
    }
}

/// Normalize and reject ids that cannot name a coin, before any quota is spent.
fn well_formed(raw_id: &str) -> Result<CoinId> {
    let coin_id = normalize(raw_id);
    if coin_id.is_empty() {
        return Err(Error::InvalidInput("coin id must not be empty".to_string()));
    }
    if !coin_id.is_well_formed() {
        return Err(Error::InvalidInput(format!("'{}' is not a valid coin id", raw_id.trim())));
    }
    Ok(coin_id)
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        warn!("CoinGecko request timed out: {}", e);
        Error::UpstreamTimeout
    } else {
        error!("CoinGecko request failed: {}", e);
        Error::HttpError(e)
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoConnector {
    async fn fetch_top_coins(&self, limit: usize) -> Result<Vec<MarketSnapshot>> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", limit.clamp(1, 250).to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "1h,7d,30d".to_string()),
        ];

        let value = self
            .get_json(&["coins", "markets"], &query, self.config.timeout, None)
            .await?;
        if !value.is_array() {
            return Err(Error::UpstreamMalformed(
                "expected a list of coins from /coins/markets".to_string(),
            ));
        }

        let markets: Vec<CoinGeckoMarket> = parse(value, "markets")?;
        Ok(markets
            .into_iter()
            .filter_map(CoinGeckoMarket::into_snapshot)
            .collect())
    }

    async fn fetch_coin_detail(&self, raw_id: &str) -> Result<MarketSnapshot> {
        self.detail(raw_id, self.config.timeout).await
    }

    async fn fetch_price_history(&self, raw_id: &str, days: u32) -> Result<PriceHistory> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(Error::InvalidInput(format!(
                "days must be between 1 and {}, got {}",
                MAX_HISTORY_DAYS, days
            )));
        }
        let coin_id = well_formed(raw_id)?;

        let query = [
            ("vs_currency", "usd".to_string()),
            ("days", days.to_string()),
        ];
        let value = self
            .get_json(
                &["coins", coin_id.as_str(), "market_chart"],
                &query,
                self.config.timeout,
                Some((raw_id, &coin_id)),
            )
            .await?;

        let chart: CoinGeckoMarketChart = parse(value, "market chart")?;
        let points = chart
            .prices
            .into_iter()
            .filter_map(|(millis, price_usd)| {
                Utc.timestamp_millis_opt(millis as i64)
                    .single()
                    .map(|timestamp| PriceHistoryPoint {
                        timestamp,
                        price_usd,
                    })
            })
            .collect();

        Ok(PriceHistory {
            coin_id,
            days,
            points,
        })
    }

    async fn fetch_trending(&self) -> Result<Vec<TrendingCoin>> {
        let value = self
            .get_json(&["search", "trending"], &[], self.config.timeout, None)
            .await?;
        let trending: CoinGeckoTrending = parse(value, "trending")?;

        Ok(trending
            .coins
            .into_iter()
            .map(|entry| TrendingCoin {
                id: CoinId::from_provider(&entry.item.id),
                name: entry.item.name,
                symbol: entry.item.symbol,
                market_cap_rank: entry.item.market_cap_rank,
                thumb_url: entry.item.thumb,
                score: entry.item.score,
            })
            .collect())
    }

    async fn verify_coin_exists(&self, coin_id: &str) -> bool {
        match self.detail(coin_id, self.config.verify_timeout).await {
            Ok(_) => true,
            Err(Error::CoinNotFound { .. }) | Err(Error::InvalidInput(_)) => false,
            Err(e) => {
                warn!("Could not verify coin {}: {}", coin_id, e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{ManualClock, RateLimitConfig};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(server: &MockServer, max_calls: usize) -> CoinGeckoConnector {
        let limiter = RateLimiter::with_clock(
            RateLimitConfig {
                window: Duration::from_secs(60),
                max_calls,
            },
            Arc::new(ManualClock::new()),
        );
        let config = GatewayConfig {
            base_url: server.uri(),
            timeout: Duration::from_millis(300),
            verify_timeout: Duration::from_millis(300),
            ..GatewayConfig::default()
        };
        CoinGeckoConnector::new(config, Arc::new(limiter)).unwrap()
    }

    fn bitcoin_detail() -> Value {
        json!({
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "image": { "thumb": "t.png", "small": "s.png", "large": "l.png" },
            "description": { "en": "The first cryptocurrency." },
            "market_cap_rank": 1,
            "market_data": {
                "current_price": { "usd": 64000.5, "eur": 59000.0 },
                "market_cap": { "usd": 1.26e12 },
                "total_volume": { "usd": 3.1e10 },
                "price_change_percentage_1h_in_currency": { "usd": 0.2 },
                "price_change_percentage_24h": -1.25,
                "price_change_percentage_7d": 4.0,
                "price_change_percentage_30d": 12.5,
                "circulating_supply": 19700000.0,
                "total_supply": 21000000.0,
                "max_supply": 21000000.0,
                "last_updated": "2024-05-01T12:00:00.000Z"
            }
        })
    }

    #[tokio::test]
    async fn top_coins_are_parsed_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("order", "market_cap_desc"))
            .and(query_param("per_page", "2"))
            .and(query_param("sparkline", "false"))
            .and(query_param("price_change_percentage", "1h,7d,30d"))
            .and(header("user-agent", "CoinSight/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
                    "image": "btc.png", "current_price": 64000.0,
                    "market_cap": 1.2e12, "market_cap_rank": 1,
                    "total_volume": 3.0e10, "price_change_percentage_24h": 1.5,
                    "price_change_percentage_1h_in_currency": 0.1,
                    "price_change_percentage_7d_in_currency": -2.5,
                    "price_change_percentage_30d_in_currency": 8.0
                },
                {
                    "id": "ethereum", "symbol": "eth", "name": "Ethereum",
                    "current_price": 3100.0, "market_cap_rank": 2
                },
                {
                    "id": "delisted", "symbol": "dl", "name": "Delisted",
                    "current_price": null
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let coins = connector(&server, 30).fetch_top_coins(2).await.unwrap();

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(coins[0].current_price_usd, 64000.0);
        assert_eq!(coins[0].price_change_pct.h24, Some(1.5));
        assert_eq!(coins[0].price_change_pct.h1, Some(0.1));
        assert_eq!(coins[0].price_change_pct.d7, Some(-2.5));
        assert_eq!(coins[0].price_change_pct.d30, Some(8.0));
        assert_eq!(coins[0].image_url.as_deref(), Some("btc.png"));
        assert_eq!(coins[1].id, "ethereum");
        assert!(coins[1].market_cap_usd.is_none());
    }

    #[tokio::test]
    async fn malformed_ids_never_reach_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bitcoin_detail()))
            .expect(0)
            .mount(&server)
            .await;
        let gateway = connector(&server, 30);

        for raw in ["bitcoin?x=1", "../search/trending", "bitcoin#frag", "bitcoin/market_chart"] {
            assert!(matches!(
                gateway.fetch_coin_detail(raw).await,
                Err(Error::InvalidInput(_))
            ));
            assert!(matches!(
                gateway.fetch_price_history(raw, 7).await,
                Err(Error::InvalidInput(_))
            ));
            assert!(!gateway.verify_coin_exists(raw).await);
        }
        assert_eq!(gateway.limiter().remaining(), 30);
    }

    #[test]
    fn endpoint_escapes_each_segment() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let gateway = CoinGeckoConnector::new(GatewayConfig::default(), limiter).unwrap();

        let url = gateway.endpoint(&["coins", "markets"]).unwrap();
        assert_eq!(url.as_str(), "https://api.coingecko.com/api/v3/coins/markets");

        let url = gateway.endpoint(&["coins", "a b/c?d#e"]).unwrap();
        assert_eq!(url.path(), "/api/v3/coins/a%20b%2Fc%3Fd%23e");
        assert!(url.query().is_none());
    }

    #[tokio::test]
    async fn non_array_markets_payload_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;

        let err = connector(&server, 30).fetch_top_coins(50).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamMalformed(_)));
    }

    #[tokio::test]
    async fn upstream_429_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
            .mount(&server)
            .await;

        let err = connector(&server, 30).fetch_top_coins(50).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamRateLimited { retry_after: 17 }));
    }

    #[tokio::test]
    async fn upstream_429_without_header_defaults_to_a_minute() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/bitcoin"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = connector(&server, 30)
            .fetch_coin_detail("btc")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamRateLimited { retry_after: 60 }));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/markets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = connector(&server, 30).fetch_top_coins(50).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamTimeout));
    }

    #[tokio::test]
    async fn other_statuses_map_to_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = connector(&server, 30).fetch_top_coins(50).await.unwrap_err();
        match err {
            Error::UpstreamError { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn coin_detail_normalizes_and_trims_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/bitcoin"))
            .and(query_param("localization", "false"))
            .and(query_param("tickers", "false"))
            .and(query_param("market_data", "true"))
            .and(query_param("community_data", "false"))
            .and(query_param("developer_data", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bitcoin_detail()))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = connector(&server, 30)
            .fetch_coin_detail(" BTC ")
            .await
            .unwrap();

        assert_eq!(snapshot.id, "bitcoin");
        assert_eq!(snapshot.current_price_usd, 64000.5);
        assert_eq!(snapshot.market_cap_usd, Some(1.26e12));
        assert_eq!(snapshot.price_change_pct.h1, Some(0.2));
        assert_eq!(snapshot.price_change_pct.d30, Some(12.5));
        assert_eq!(snapshot.image_url.as_deref(), Some("l.png"));
        assert_eq!(snapshot.max_supply, Some(21000000.0));
        assert!(snapshot.last_updated.is_some());
    }

    #[tokio::test]
    async fn missing_coin_suggests_normalized_id() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/xyz-nonexistent"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "coin not found" })))
            .mount(&server)
            .await;

        let err = connector(&server, 30)
            .fetch_coin_detail("XYZ-nonexistent")
            .await
            .unwrap_err();

        match err {
            Error::CoinNotFound {
                requested_id,
                suggested_id,
            } => {
                assert_eq!(requested_id, "XYZ-nonexistent");
                assert_eq!(suggested_id, "xyz-nonexistent");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn detail_without_market_data_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/ethereum"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ethereum", "symbol": "eth", "name": "Ethereum"
            })))
            .mount(&server)
            .await;

        let err = connector(&server, 30)
            .fetch_coin_detail("eth")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamMalformed(_)));
    }

    #[tokio::test]
    async fn local_rejection_skips_outbound_call() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/bitcoin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bitcoin_detail()))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = connector(&server, 1);
        gateway.fetch_coin_detail("bitcoin").await.unwrap();
        let err = gateway.fetch_coin_detail("bitcoin").await.unwrap_err();

        assert!(matches!(err, Error::LocalRateLimited { retry_after } if retry_after > 0));
    }

    #[tokio::test]
    async fn verification_fails_open_except_on_404() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/bitcoin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bitcoin_detail()))
            .mount(&server)
            .await;
        Mock::given(path("/coins/ethereum"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(path("/coins/cardano"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(path("/coins/not-a-coin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = connector(&server, 30);
        assert!(gateway.verify_coin_exists("btc").await);
        assert!(gateway.verify_coin_exists("eth").await);
        assert!(gateway.verify_coin_exists("ada").await);
        assert!(!gateway.verify_coin_exists("not-a-coin").await);
    }

    #[tokio::test]
    async fn verification_fails_open_when_locally_limited() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/not-a-coin"))
            .respond_with(ResponseTemplate::new(404))
            .expect(0)
            .mount(&server)
            .await;

        let gateway = connector(&server, 0);
        assert!(gateway.verify_coin_exists("not-a-coin").await);
    }

    #[tokio::test]
    async fn price_history_converts_millis() {
        let server = MockServer::start().await;
        Mock::given(path("/coins/ethereum/market_chart"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("days", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "prices": [[1714521600000u64, 3000.0], [1714608000000u64, 3150.0]],
                "market_caps": [],
                "total_volumes": []
            })))
            .mount(&server)
            .await;

        let history = connector(&server, 30)
            .fetch_price_history("ETH", 30)
            .await
            .unwrap();

        assert_eq!(history.coin_id, "ethereum");
        assert_eq!(history.points.len(), 2);
        assert_eq!(history.points[0].timestamp.timestamp(), 1714521600);
        assert_eq!(history.change_pct(), Some(5.0));
    }

    #[tokio::test]
    async fn price_history_rejects_bad_range_without_calling_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let gateway = connector(&server, 30);
        for days in [0, MAX_HISTORY_DAYS + 1] {
            let err = gateway.fetch_price_history("btc", days).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn trending_coins_are_flattened() {
        let server = MockServer::start().await;
        Mock::given(path("/search/trending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "coins": [
                    { "item": { "id": "pepe", "name": "Pepe", "symbol": "PEPE",
                                "market_cap_rank": 30, "thumb": "p.png", "score": 0 } },
                    { "item": { "id": "sui", "name": "Sui", "symbol": "SUI", "score": 1 } }
                ],
                "exchanges": []
            })))
            .mount(&server)
            .await;

        let trending = connector(&server, 30).fetch_trending().await.unwrap();
        assert_eq!(trending.len(), 2);
        assert_eq!(trending[0].id, "pepe");
        assert_eq!(trending[0].market_cap_rank, Some(30));
        assert_eq!(trending[1].score, Some(1));
        assert!(trending[1].thumb_url.is_none());
    }

    #[tokio::test]
    async fn api_key_is_forwarded_when_configured() {
        let server = MockServer::start().await;
        Mock::given(path("/search/trending"))
            .and(header(API_KEY_HEADER, "demo-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "coins": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let config = GatewayConfig {
            base_url: server.uri(),
            api_key: Some("demo-key".to_string()),
            ..GatewayConfig::default()
        };
        let gateway = CoinGeckoConnector::new(config, limiter).unwrap();
        assert!(gateway.fetch_trending().await.unwrap().is_empty());
    }
}
