use crate::{StoreConfig, StoreError};
use async_trait::async_trait;
use common::{
    models::{Portfolio, Watchlist},
    Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

pub type WatchlistUpdate = Box<dyn FnOnce(&mut Watchlist) -> Result<()> + Send>;
pub type PortfolioUpdate = Box<dyn FnOnce(&mut Portfolio) -> Result<()> + Send>;

/// Everything stored for one user
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub watchlist: Watchlist,
    #[serde(default)]
    pub portfolio: Portfolio,
}

/// Persistence seam for per-user watchlists and portfolios.
///
/// Updates run the given mutation against a copy of the user's list and
/// commit it only when the mutation succeeds, so a failed update leaves the
/// stored state untouched. Updates for one user are serialized.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn watchlist(&self, user_id: &str) -> Result<Watchlist>;

    async fn portfolio(&self, user_id: &str) -> Result<Portfolio>;

    async fn update_watchlist(&self, user_id: &str, update: WatchlistUpdate) -> Result<Watchlist>;

    async fn update_portfolio(&self, user_id: &str, update: PortfolioUpdate) -> Result<Portfolio>;
}

pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
    config: StoreConfig,
}

impl MemoryUserStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Build a store, restoring state from the configured snapshot file if it exists.
    pub async fn load(config: StoreConfig) -> std::result::Result<Self, StoreError> {
        let mut users = HashMap::new();

        if let Some(path) = &config.snapshot_path {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    users = serde_json::from_slice(&bytes)?;
                    info!("Loaded {} users from {}", users.len(), path.display());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!("No snapshot at {}, starting empty", path.display());
                }
                Err(e) => return Err(StoreError::SnapshotReadError(e.to_string())),
            }
        }

        Ok(Self {
            users: RwLock::new(users),
            config,
        })
    }

    pub async fn register_user(&self, user_id: &str) {
        self.users
            .write()
            .await
            .entry(user_id.to_string())
            .or_default();
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    async fn read_record<T>(&self, user_id: &str, f: impl FnOnce(&UserRecord) -> T) -> Result<T> {
        let users = self.users.read().await;
        match users.get(user_id) {
            Some(record) => Ok(f(record)),
            None if self.config.auto_provision => Ok(f(&UserRecord::default())),
            None => Err(StoreError::UserNotFound(user_id.to_string()).into()),
        }
    }

    async fn modify_record<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut UserRecord) -> Result<T>,
    ) -> Result<T> {
        let mut users = self.users.write().await;

        let mut record = match users.get(user_id) {
            Some(record) => record.clone(),
            None if self.config.auto_provision => {
                debug!("Provisioning record for user {}", user_id);
                UserRecord::default()
            }
            None => return Err(StoreError::UserNotFound(user_id.to_string()).into()),
        };

        let out = f(&mut record)?;
        let previous = users.insert(user_id.to_string(), record);

        // Memory never holds a change the snapshot lacks.
        if let Err(e) = self.persist(&users).await {
            error!("Failed to persist user store: {}", e);
            match previous {
                Some(previous) => users.insert(user_id.to_string(), previous),
                None => users.remove(user_id),
            };
            return Err(e.into());
        }
        Ok(out)
    }

    /// Write the snapshot to a sibling temp file and rename it into place, so
    /// a crash mid-write never leaves a truncated snapshot behind.
    async fn persist(&self, users: &HashMap<String, UserRecord>) -> std::result::Result<(), StoreError> {
        let Some(path) = &self.config.snapshot_path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(users)?;
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| StoreError::SnapshotWriteError(e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::SnapshotWriteError(e.to_string()));
        }
        debug!("Wrote user snapshot to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn watchlist(&self, user_id: &str) -> Result<Watchlist> {
        self.read_record(user_id, |record| record.watchlist.clone())
            .await
    }

    async fn portfolio(&self, user_id: &str) -> Result<Portfolio> {
        self.read_record(user_id, |record| record.portfolio.clone())
            .await
    }

    async fn update_watchlist(&self, user_id: &str, update: WatchlistUpdate) -> Result<Watchlist> {
        self.modify_record(user_id, |record| {
            update(&mut record.watchlist)?;
            Ok(record.watchlist.clone())
        })
        .await
    }

    async fn update_portfolio(&self, user_id: &str, update: PortfolioUpdate) -> Result<Portfolio> {
        self.modify_record(user_id, |record| {
            update(&mut record.portfolio)?;
            Ok(record.portfolio.clone())
        })
        .await
    }
}
