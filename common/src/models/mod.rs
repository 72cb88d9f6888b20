mod coin;
mod market;
mod portfolio;

pub use coin::{normalize, CoinId, COIN_ALIASES};
pub use market::{MarketSnapshot, PriceChange, PriceHistory, PriceHistoryPoint, TrendingCoin};
pub use portfolio::{
    CostBasisMerge, HoldingInput, Portfolio, PortfolioHolding, Watchlist, WatchlistEntry,
};
