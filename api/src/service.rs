use chrono::Utc;
use common::{
    format,
    models::{
        normalize, CoinId, CostBasisMerge, HoldingInput, MarketSnapshot, Portfolio, PriceHistory,
        TrendingCoin, Watchlist,
    },
    valuation::{valuate, PortfolioStats},
    Error, Result,
};
use connectors::MarketDataProvider;
use std::sync::Arc;
use std::time::Duration;
use store::UserStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline;

pub const DEFAULT_HISTORY_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub top_coins_limit: usize,
    pub cost_basis_merge: CostBasisMerge,
    pub valuation_pacing: Duration,
    pub valuation_deadline: Duration,
}

/// Market data lookups plus the per-user watchlist and portfolio
pub struct CryptoService {
    /// Rate-limited gateway to the price provider
    market: Arc<dyn MarketDataProvider>,
    /// Per-user lists
    store: Arc<dyn UserStore>,
    settings: ServiceSettings,
}

impl CryptoService {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        store: Arc<dyn UserStore>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            market,
            store,
            settings,
        }
    }

    /// Top coins by market cap
    pub async fn top_coins(&self) -> Result<Vec<MarketSnapshot>> {
        let coins = self.market.fetch_top_coins(self.settings.top_coins_limit).await?;
        let total_cap: f64 = coins.iter().filter_map(|c| c.market_cap_usd).sum();
        debug!(
            "Fetched {} top coins, combined market cap {}",
            coins.len(),
            format::compact_usd(total_cap)
        );
        Ok(coins)
    }

    pub async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        self.market.fetch_trending().await
    }

    pub async fn coin_detail(&self, raw_id: &str) -> Result<MarketSnapshot> {
        self.market.fetch_coin_detail(raw_id).await
    }

    pub async fn price_history(&self, raw_id: &str, days: Option<u32>) -> Result<PriceHistory> {
        self.market
            .fetch_price_history(raw_id, days.unwrap_or(DEFAULT_HISTORY_DAYS))
            .await
    }

    pub async fn watchlist(&self, user_id: &str) -> Result<Watchlist> {
        self.store.watchlist(user_id).await
    }

    /// Watch a coin. Adding an already watched coin changes nothing and
    /// costs no upstream call.
    pub async fn add_to_watchlist(&self, user_id: &str, raw_id: &str) -> Result<Watchlist> {
        let coin_id = well_formed(raw_id)?;
        let current = self.store.watchlist(user_id).await?;
        if current.contains(&coin_id) {
            debug!("{} already on watchlist", coin_id);
            return Ok(current);
        }
        let coin_id = self.verified_coin(raw_id).await?;

        self.store
            .update_watchlist(
                user_id,
                Box::new(move |watchlist: &mut Watchlist| {
                    if !watchlist.insert(coin_id.clone()) {
                        debug!("{} already on watchlist", coin_id);
                    }
                    Ok(())
                }),
            )
            .await
    }

    pub async fn remove_from_watchlist(&self, user_id: &str, raw_id: &str) -> Result<Watchlist> {
        let coin_id = normalize(raw_id);
        self.store
            .update_watchlist(
                user_id,
                Box::new(move |watchlist: &mut Watchlist| {
                    watchlist.remove(&coin_id);
                    Ok(())
                }),
            )
            .await
    }

    pub async fn portfolio(&self, user_id: &str) -> Result<Portfolio> {
        self.store.portfolio(user_id).await
    }

    /// Record a purchase. A coin that is already held is merged into the
    /// existing holding using the configured cost basis policy.
    pub async fn add_to_portfolio(
        &self,
        user_id: &str,
        raw_id: &str,
        amount: f64,
        purchase_price: f64,
    ) -> Result<Portfolio> {
        let input = HoldingInput::new(amount, purchase_price)?;
        let coin_id = self.verified_coin(raw_id).await?;
        let merge = self.settings.cost_basis_merge;

        self.store
            .update_portfolio(
                user_id,
                Box::new(move |portfolio: &mut Portfolio| {
                    portfolio.add(coin_id, input, merge, Utc::now()).map(|_| ())
                }),
            )
            .await
    }

    pub async fn update_portfolio_entry(
        &self,
        user_id: &str,
        index: usize,
        amount: f64,
        purchase_price: f64,
    ) -> Result<Portfolio> {
        let input = HoldingInput::new(amount, purchase_price)?;
        self.store
            .update_portfolio(
                user_id,
                Box::new(move |portfolio: &mut Portfolio| portfolio.update(index, input)),
            )
            .await
    }

    pub async fn remove_from_portfolio(&self, user_id: &str, index: usize) -> Result<Portfolio> {
        self.store
            .update_portfolio(
                user_id,
                Box::new(move |portfolio: &mut Portfolio| portfolio.remove(index).map(|_| ())),
            )
            .await
    }

    /// Value the user's holdings at live prices.
    ///
    /// Prices are fetched one coin at a time on the configured pacing. If the
    /// gateway rate limits or the deadline passes, the holdings priced so far
    /// are valued and the rest count as unpriced.
    pub async fn portfolio_stats(&self, user_id: &str) -> Result<PortfolioStats> {
        let portfolio = self.store.portfolio(user_id).await?;
        let coin_ids = portfolio.coin_ids();

        let cancel = CancellationToken::new();
        let fetch = pipeline::fetch_snapshots(
            self.market.as_ref(),
            &coin_ids,
            self.settings.valuation_pacing,
            &cancel,
        );
        tokio::pin!(fetch);

        let batch = tokio::select! {
            batch = &mut fetch => batch,
            _ = tokio::time::sleep(self.settings.valuation_deadline) => {
                debug!("Valuation deadline reached for {}", user_id);
                cancel.cancel();
                fetch.await
            }
        };

        let stats = valuate(portfolio.holdings(), &batch.snapshots);
        if !batch.unresolved.is_empty() {
            warn!(
                "Partial valuation for {}: no price for {}",
                user_id,
                join_ids(&batch.unresolved)
            );
        }
        info!(
            "Valued {} holdings for {}: {} invested, {} current ({})",
            stats.holdings.len(),
            user_id,
            format::usd(stats.total_invested),
            format::usd(stats.total_current_value),
            format::pct(stats.total_gain_loss_pct)
        );

        Ok(stats)
    }

    /// Normalize and check existence. Only a confirmed miss refuses the coin.
    async fn verified_coin(&self, raw_id: &str) -> Result<CoinId> {
        let coin_id = well_formed(raw_id)?;

        if !self.market.verify_coin_exists(coin_id.as_str()).await {
            return Err(Error::UnverifiedCoin {
                requested_id: raw_id.to_string(),
                suggested_id: coin_id.to_string(),
            });
        }
        Ok(coin_id)
    }
}

/// Ids that cannot name a coin are refused before any upstream call.
fn well_formed(raw_id: &str) -> Result<CoinId> {
    let coin_id = normalize(raw_id);
    if coin_id.is_empty() {
        return Err(Error::InvalidInput("coinId is required".to_string()));
    }
    if !coin_id.is_well_formed() {
        return Err(Error::InvalidInput(format!(
            "'{}' is not a valid coin id",
            raw_id.trim()
        )));
    }
    Ok(coin_id)
}

fn join_ids(ids: &[CoinId]) -> String {
    ids.iter()
        .map(CoinId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
