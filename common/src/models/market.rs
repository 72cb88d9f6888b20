use crate::models::CoinId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentage price change over the standard lookback periods
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceChange {
    #[serde(rename = "1h")]
    pub h1: Option<f64>,
    #[serde(rename = "24h")]
    pub h24: Option<f64>,
    #[serde(rename = "7d")]
    pub d7: Option<f64>,
    #[serde(rename = "30d")]
    pub d30: Option<f64>,
}

/// Point-in-time market data for a single coin. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    /// Canonical provider identifier
    pub id: CoinId,
    /// Human-readable name (e.g., "Bitcoin")
    pub name: String,
    /// Ticker symbol (e.g., "btc")
    pub symbol: String,
    pub image_url: Option<String>,
    /// English description, only present on detail lookups
    pub description: Option<String>,
    /// Current price in USD
    pub current_price_usd: f64,
    pub market_cap_usd: Option<f64>,
    /// 24h traded volume in USD
    pub volume_24h_usd: Option<f64>,
    pub price_change_pct: PriceChange,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub market_cap_rank: Option<u32>,
    /// When the provider last refreshed this data
    pub last_updated: Option<DateTime<Utc>>,
}

/// Price history point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryPoint {
    /// Timestamp for this price point
    pub timestamp: DateTime<Utc>,
    /// The USD price at this point in time
    pub price_usd: f64,
}

/// Historical USD prices for a coin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistory {
    pub coin_id: CoinId,
    /// Number of trailing days covered
    pub days: u32,
    /// Price data points, oldest first
    pub points: Vec<PriceHistoryPoint>,
}

impl PriceHistory {
    pub fn latest(&self) -> Option<&PriceHistoryPoint> {
        self.points.last()
    }

    /// Percentage change between the first and last point.
    pub fn change_pct(&self) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if first.price_usd > 0.0 {
            Some((last.price_usd - first.price_usd) / first.price_usd * 100.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendingCoin {
    pub id: CoinId,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub thumb_url: Option<String>,
    /// Position in the provider's trending list, 0 is hottest
    pub score: Option<u32>,
}
