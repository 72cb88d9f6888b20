use async_trait::async_trait;
use chrono::Utc;
use common::{
    models::{
        normalize, CoinId, MarketSnapshot, PriceChange, PriceHistory, PriceHistoryPoint,
        TrendingCoin,
    },
    Error, Result,
};
use connectors::MarketDataProvider;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-process stand-in for the CoinGecko gateway
#[derive(Default)]
pub struct FakeMarket {
    prices: HashMap<String, f64>,
    unavailable: HashSet<String>,
    rate_limited_after: Option<usize>,
    calls: AtomicUsize,
}

impl FakeMarket {
    pub fn with_prices(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices
                .iter()
                .map(|(id, price)| (id.to_string(), *price))
                .collect(),
            ..Default::default()
        }
    }

    /// Calls beyond the first `n` fail with an upstream 429
    pub fn rate_limited_after(mut self, n: usize) -> Self {
        self.rate_limited_after = Some(n);
        self
    }

    /// Lookups for these ids time out
    pub fn unavailable(mut self, ids: &[&str]) -> Self {
        self.unavailable = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn admit(&self) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.rate_limited_after {
            Some(limit) if call > limit => Err(Error::UpstreamRateLimited { retry_after: 30 }),
            _ => Ok(()),
        }
    }
}

pub fn snapshot(id: &str, price: f64) -> MarketSnapshot {
    MarketSnapshot {
        id: CoinId::from_provider(id),
        name: id.to_string(),
        symbol: id.chars().take(3).collect(),
        image_url: None,
        description: None,
        current_price_usd: price,
        market_cap_usd: None,
        volume_24h_usd: None,
        price_change_pct: PriceChange::default(),
        circulating_supply: None,
        total_supply: None,
        max_supply: None,
        market_cap_rank: None,
        last_updated: None,
    }
}

#[async_trait]
impl MarketDataProvider for FakeMarket {
    async fn fetch_top_coins(&self, limit: usize) -> Result<Vec<MarketSnapshot>> {
        self.admit()?;
        let mut coins: Vec<MarketSnapshot> = self
            .prices
            .iter()
            .map(|(id, price)| snapshot(id, *price))
            .collect();
        coins.sort_by(|a, b| b.current_price_usd.total_cmp(&a.current_price_usd));
        coins.truncate(limit);
        Ok(coins)
    }

    async fn fetch_coin_detail(&self, raw_id: &str) -> Result<MarketSnapshot> {
        self.admit()?;
        let coin_id = normalize(raw_id);
        if self.unavailable.contains(coin_id.as_str()) {
            return Err(Error::UpstreamTimeout);
        }
        match self.prices.get(coin_id.as_str()) {
            Some(price) => Ok(snapshot(coin_id.as_str(), *price)),
            None => Err(Error::CoinNotFound {
                requested_id: raw_id.to_string(),
                suggested_id: coin_id.to_string(),
            }),
        }
    }

    async fn fetch_price_history(&self, raw_id: &str, days: u32) -> Result<PriceHistory> {
        let current = self.fetch_coin_detail(raw_id).await?;
        let now = Utc::now();
        Ok(PriceHistory {
            coin_id: current.id,
            days,
            points: vec![
                PriceHistoryPoint {
                    timestamp: now - chrono::Duration::days(days as i64),
                    price_usd: current.current_price_usd / 2.0,
                },
                PriceHistoryPoint {
                    timestamp: now,
                    price_usd: current.current_price_usd,
                },
            ],
        })
    }

    async fn fetch_trending(&self) -> Result<Vec<TrendingCoin>> {
        self.admit()?;
        Ok(Vec::new())
    }
}
