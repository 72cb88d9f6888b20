use common::{models::CostBasisMerge, Error, Result};
use connectors::RateLimitConfig;
use std::time::Duration;

use crate::service::ServiceSettings;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Secret used to verify bearer tokens
    pub jwt_secret: String,
    pub rate_limit: RateLimitConfig,
    pub top_coins_limit: usize,
    /// Gap between consecutive detail lookups when valuing a portfolio
    pub valuation_pacing: Duration,
    /// After this, a valuation settles for whatever prices it already has
    pub valuation_deadline: Duration,
    pub cost_basis_merge: CostBasisMerge,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            jwt_secret: String::new(),
            rate_limit: RateLimitConfig::default(),
            top_coins_limit: 50,
            valuation_pacing: Duration::from_millis(1000),
            valuation_deadline: Duration::from_secs(30),
            cost_basis_merge: CostBasisMerge::default(),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::ConfigError(format!("{} has an invalid value: '{}'", name, value))),
        Err(_) => Ok(default),
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| Error::ConfigError("JWT_SECRET environment variable not set".to_string()))?;

        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(env_or(
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit.window.as_secs(),
            )?),
            max_calls: env_or("RATE_LIMIT_MAX_CALLS", defaults.rate_limit.max_calls)?,
        };

        let cost_basis_merge = match std::env::var("PORTFOLIO_MERGE") {
            Ok(policy) => policy.parse()?,
            Err(_) => defaults.cost_basis_merge,
        };

        Ok(Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_or("API_PORT", defaults.port)?,
            jwt_secret,
            rate_limit,
            top_coins_limit: env_or("TOP_COINS_LIMIT", defaults.top_coins_limit)?,
            valuation_pacing: Duration::from_millis(env_or(
                "VALUATION_PACING_MS",
                defaults.valuation_pacing.as_millis() as u64,
            )?),
            valuation_deadline: Duration::from_secs(env_or(
                "VALUATION_DEADLINE_SECS",
                defaults.valuation_deadline.as_secs(),
            )?),
            cost_basis_merge,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            top_coins_limit: self.top_coins_limit,
            cost_basis_merge: self.cost_basis_merge,
            valuation_pacing: self.valuation_pacing,
            valuation_deadline: self.valuation_deadline,
        }
    }
}
