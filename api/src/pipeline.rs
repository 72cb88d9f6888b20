//! Paced retrieval of per-coin snapshots for portfolio valuation.
//!
//! Detail lookups are issued one at a time on a fixed interval so a full
//! valuation stays under the gateway's admission threshold. A rate-limit
//! rejection or cancellation ends the run; whatever was fetched up to that
//! point is still returned.

use common::models::{CoinId, MarketSnapshot};
use connectors::MarketDataProvider;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct SnapshotBatch {
    pub snapshots: HashMap<CoinId, MarketSnapshot>,
    /// Coins with no snapshot, either failed or never attempted
    pub unresolved: Vec<CoinId>,
    /// Set when the run stopped before attempting every coin
    pub interrupted: bool,
}

pub async fn fetch_snapshots(
    provider: &dyn MarketDataProvider,
    coin_ids: &[CoinId],
    pacing: Duration,
    cancel: &CancellationToken,
) -> SnapshotBatch {
    let mut batch = SnapshotBatch::default();
    // interval() panics on a zero period
    let mut ticker = tokio::time::interval(pacing.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending = coin_ids.iter();
    while let Some(coin_id) = pending.next() {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = async {
                ticker.tick().await;
                provider.fetch_coin_detail(coin_id.as_str()).await
            } => Some(result),
        };

        match result {
            None => {
                debug!("Snapshot fetch cancelled before {}", coin_id);
                batch.unresolved.push(coin_id.clone());
                batch.interrupted = true;
                break;
            }
            Some(Ok(snapshot)) => {
                batch.snapshots.insert(coin_id.clone(), snapshot);
            }
            Some(Err(e)) if e.is_rate_limited() => {
                warn!("Rate limited while fetching {}, stopping: {}", coin_id, e);
                batch.unresolved.push(coin_id.clone());
                batch.interrupted = true;
                break;
            }
            Some(Err(e)) => {
                warn!("No snapshot for {}: {}", coin_id, e);
                batch.unresolved.push(coin_id.clone());
            }
        }
    }

    batch.unresolved.extend(pending.cloned());
    batch
}
