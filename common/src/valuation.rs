//! Portfolio valuation against live market snapshots.
//!
//! Pure arithmetic: fetching the snapshots is the caller's job. Holdings
//! whose coin has no snapshot still count toward the invested total but
//! contribute no current value.

use crate::models::{CoinId, MarketSnapshot, PortfolioHolding};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldingValuation {
    pub coin_id: CoinId,
    pub amount: f64,
    pub purchase_price: f64,
    /// None when no snapshot was available for this coin
    pub current_price: Option<f64>,
    pub invested: f64,
    pub current_value: f64,
    pub gain_loss: f64,
    pub gain_loss_pct: f64,
}

impl HoldingValuation {
    pub fn is_priced(&self) -> bool {
        self.current_price.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioStats {
    pub holdings: Vec<HoldingValuation>,
    pub total_invested: f64,
    pub total_current_value: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_pct: f64,
    pub priced_holdings: usize,
    pub unpriced_holdings: usize,
}

impl PortfolioStats {
    pub fn is_complete(&self) -> bool {
        self.unpriced_holdings == 0
    }
}

fn pct(gain_loss: f64, invested: f64) -> f64 {
    if invested > 0.0 {
        gain_loss / invested * 100.0
    } else {
        0.0
    }
}

pub fn valuate(
    holdings: &[PortfolioHolding],
    snapshots: &HashMap<CoinId, MarketSnapshot>,
) -> PortfolioStats {
    let mut stats = PortfolioStats::default();

    for holding in holdings {
        let invested = holding.invested();
        let current_price = snapshots
            .get(&holding.coin_id)
            .map(|snapshot| snapshot.current_price_usd);
        let current_value = current_price.map_or(0.0, |price| holding.amount * price);
        let gain_loss = current_value - invested;

        if current_price.is_some() {
            stats.priced_holdings += 1;
        } else {
            stats.unpriced_holdings += 1;
        }
        stats.total_invested += invested;
        stats.total_current_value += current_value;

        stats.holdings.push(HoldingValuation {
            coin_id: holding.coin_id.clone(),
            amount: holding.amount,
            purchase_price: holding.purchase_price,
            current_price,
            invested,
            current_value,
            gain_loss,
            gain_loss_pct: pct(gain_loss, invested),
        });
    }

    stats.total_gain_loss = stats.total_current_value - stats.total_invested;
    stats.total_gain_loss_pct = pct(stats.total_gain_loss, stats.total_invested);
    stats
}
