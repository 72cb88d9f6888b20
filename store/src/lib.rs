mod config;
mod error;
mod user_store;

pub use config::StoreConfig;
pub use error::StoreError;
pub use user_store::{MemoryUserStore, PortfolioUpdate, UserRecord, UserStore, WatchlistUpdate};
