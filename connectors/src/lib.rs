pub mod coingecko;
pub mod rate_limit;

use async_trait::async_trait;
use common::{
    models::{MarketSnapshot, PriceHistory, TrendingCoin},
    Error, Result,
};
use tracing::warn;

pub use rate_limit::{Admission, Clock, ManualClock, RateLimitConfig, RateLimiter, SystemClock};

/// Trait defining the interface for market data gateways
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Top coins ordered by market cap, descending
    async fn fetch_top_coins(&self, limit: usize) -> Result<Vec<MarketSnapshot>>;

    /// Market data for one coin; `raw_id` may be a ticker alias
    async fn fetch_coin_detail(&self, raw_id: &str) -> Result<MarketSnapshot>;

    /// Daily-or-finer USD price history over the trailing `days`
    async fn fetch_price_history(&self, raw_id: &str, days: u32) -> Result<PriceHistory>;

    /// Coins currently trending on the provider
    async fn fetch_trending(&self) -> Result<Vec<TrendingCoin>>;

    /// Best-effort existence check used before accepting a new entry.
    ///
    /// Only a confirmed "not found" or an id that cannot name a coin returns
    /// false. Rate limiting, timeouts and other failures let the write through.
    async fn verify_coin_exists(&self, coin_id: &str) -> bool {
        match self.fetch_coin_detail(coin_id).await {
            Ok(_) => true,
            Err(Error::CoinNotFound { .. }) | Err(Error::InvalidInput(_)) => false,
            Err(e) => {
                warn!("Could not verify coin {}: {}", coin_id, e);
                true
            }
        }
    }
}
