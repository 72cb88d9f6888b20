use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    LocalRateLimited { retry_after: u64 },

    #[error("Upstream rate limit exceeded, retry after {retry_after}s")]
    UpstreamRateLimited { retry_after: u64 },

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Malformed upstream response: {0}")]
    UpstreamMalformed(String),

    #[error("Upstream API error: {status} - {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Coin '{requested_id}' not found")]
    CoinNotFound {
        requested_id: String,
        suggested_id: String,
    },

    /// Raised when an add is refused because the provider confirmed the coin does not exist.
    #[error("Cryptocurrency '{requested_id}' not found. Please check the coin ID.")]
    UnverifiedCoin {
        requested_id: String,
        suggested_id: String,
    },

    #[error("Index {index} out of range for {len} entries")]
    InvalidIndex { index: usize, len: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Stable machine-readable code for the error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::LocalRateLimited { .. } => "local_rate_limited",
            Error::UpstreamRateLimited { .. } => "upstream_rate_limited",
            Error::UpstreamTimeout => "upstream_timeout",
            Error::UpstreamMalformed(_) => "upstream_malformed",
            Error::UpstreamError { .. } => "upstream_error",
            Error::CoinNotFound { .. } => "coin_not_found",
            Error::UnverifiedCoin { .. } => "invalid_coin_id",
            Error::InvalidIndex { .. } => "invalid_index",
            Error::InvalidInput(_) => "invalid_input",
            Error::UserNotFound(_) => "user_not_found",
            Error::Unauthorized(_) => "unauthorized",
            Error::HttpError(_) => "http_error",
            Error::ConfigError(_) => "config_error",
            Error::InternalError(_) => "internal_error",
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::LocalRateLimited { retry_after } | Error::UpstreamRateLimited { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.retry_after().is_some()
    }

    pub fn suggested_id(&self) -> Option<&str> {
        match self {
            Error::CoinNotFound { suggested_id, .. } | Error::UnverifiedCoin { suggested_id, .. } => {
                Some(suggested_id)
            }
            _ => None,
        }
    }
}
