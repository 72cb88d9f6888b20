use crate::{models::CoinId, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub coin_id: CoinId,
}

/// A user's watched coins. Holds at most one entry per coin id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Watchlist(Vec<WatchlistEntry>);

impl Watchlist {
    pub fn entries(&self) -> &[WatchlistEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, coin_id: &CoinId) -> bool {
        self.0.iter().any(|entry| &entry.coin_id == coin_id)
    }

    /// Returns false when the coin was already watched.
    pub fn insert(&mut self, coin_id: CoinId) -> bool {
        if self.contains(&coin_id) {
            return false;
        }
        self.0.push(WatchlistEntry { coin_id });
        true
    }

    /// Returns false when nothing matched.
    pub fn remove(&mut self, coin_id: &CoinId) -> bool {
        let before = self.0.len();
        self.0.retain(|entry| &entry.coin_id != coin_id);
        self.0.len() != before
    }
}

/// How the purchase price of a repeated buy is folded into an existing holding.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CostBasisMerge {
    /// Amount-weighted average of both lots.
    #[default]
    Weighted,
    /// Plain mean of the two prices, ignoring amounts. Lossy.
    Simple,
}

impl CostBasisMerge {
    pub fn combine(self, held: &PortfolioHolding, added: &HoldingInput) -> f64 {
        match self {
            CostBasisMerge::Weighted => {
                // Weighting before summing keeps large lots finite.
                let total = held.amount + added.amount;
                held.purchase_price * (held.amount / total)
                    + added.purchase_price * (added.amount / total)
            }
            CostBasisMerge::Simple => (held.purchase_price + added.purchase_price) / 2.0,
        }
    }
}

impl FromStr for CostBasisMerge {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "weighted" => Ok(CostBasisMerge::Weighted),
            "simple" | "average" => Ok(CostBasisMerge::Simple),
            other => Err(Error::ConfigError(format!(
                "Unknown cost basis merge policy: {}. Supported: weighted, simple",
                other
            ))),
        }
    }
}

/// Validated amount and purchase price for a holding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldingInput {
    pub amount: f64,
    /// USD per unit
    pub purchase_price: f64,
}

impl HoldingInput {
    pub fn new(amount: f64, purchase_price: f64) -> Result<Self> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "amount must be a positive number, got {}",
                amount
            )));
        }
        if !purchase_price.is_finite() || purchase_price <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "purchasePrice must be a positive number, got {}",
                purchase_price
            )));
        }
        Ok(Self {
            amount,
            purchase_price,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioHolding {
    pub coin_id: CoinId,
    pub amount: f64,
    /// Cost basis in USD per unit
    pub purchase_price: f64,
    pub purchase_date: DateTime<Utc>,
}

impl PortfolioHolding {
    pub fn invested(&self) -> f64 {
        self.amount * self.purchase_price
    }
}

/// A user's holdings in insertion order. Positions are addressed by index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Portfolio(Vec<PortfolioHolding>);

impl Portfolio {
    pub fn holdings(&self) -> &[PortfolioHolding] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Distinct coin ids in holding order.
    pub fn coin_ids(&self) -> Vec<CoinId> {
        let mut ids: Vec<CoinId> = Vec::with_capacity(self.0.len());
        for holding in &self.0 {
            if !ids.contains(&holding.coin_id) {
                ids.push(holding.coin_id.clone());
            }
        }
        ids
    }

    /// Add a purchase. An existing holding of the same coin absorbs it: amounts
    /// are summed and the purchase price is combined per `merge`, which drops
    /// the per-lot cost basis. Returns the index of the affected holding.
    ///
    /// A merge whose result is not a finite positive amount and price is
    /// refused with `InvalidInput` and leaves the holding untouched.
    pub fn add(
        &mut self,
        coin_id: CoinId,
        input: HoldingInput,
        merge: CostBasisMerge,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if let Some(index) = self.0.iter().position(|h| h.coin_id == coin_id) {
            let held = &mut self.0[index];
            let amount = held.amount + input.amount;
            let purchase_price = merge.combine(held, &input);
            let merged = HoldingInput::new(amount, purchase_price).map_err(|_| {
                Error::InvalidInput(format!(
                    "adding {} to the {} holding is out of range",
                    input.amount, coin_id
                ))
            })?;
            held.amount = merged.amount;
            held.purchase_price = merged.purchase_price;
            return Ok(index);
        }

        self.0.push(PortfolioHolding {
            coin_id,
            amount: input.amount,
            purchase_price: input.purchase_price,
            purchase_date: now,
        });
        Ok(self.0.len() - 1)
    }

    pub fn update(&mut self, index: usize, input: HoldingInput) -> Result<()> {
        let len = self.0.len();
        let holding = self
            .0
            .get_mut(index)
            .ok_or(Error::InvalidIndex { index, len })?;
        holding.amount = input.amount;
        holding.purchase_price = input.purchase_price;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<PortfolioHolding> {
        if index >= self.0.len() {
            return Err(Error::InvalidIndex {
                index,
                len: self.0.len(),
            });
        }
        Ok(self.0.remove(index))
    }
}
