use serde::{Deserialize, Serialize};

/// Shorthand tickers accepted in place of provider identifiers.
pub const COIN_ALIASES: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("eth", "ethereum"),
    ("ada", "cardano"),
    ("dot", "polkadot"),
    ("link", "chainlink"),
    ("ltc", "litecoin"),
    ("xrp", "ripple"),
    ("bch", "bitcoin-cash"),
    ("eos", "eos"),
    ("trx", "tron"),
];

/// Canonical provider identifier for a coin (e.g., "bitcoin").
///
/// Only constructed through [`normalize`] or deserialization of already stored
/// values, so everything held internally is in normalized form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CoinId(String);

impl CoinId {
    /// Wrap an identifier that came from the provider itself. Skips the
    /// alias table, which only applies to user input.
    pub fn from_provider(id: &str) -> Self {
        CoinId(id.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Provider ids are lowercase ASCII letters, digits, `-` and `_`. Anything
    /// else cannot name a coin and must not reach an upstream URL.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
    }
}

impl AsRef<str> for CoinId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CoinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for CoinId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for CoinId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Resolve user input to a canonical coin identifier.
///
/// Input is trimmed and lower-cased, then looked up in [`COIN_ALIASES`].
/// Anything not in the table is assumed to already be canonical.
pub fn normalize(raw: &str) -> CoinId {
    let lowered = raw.trim().to_lowercase();
    let canonical = COIN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, id)| (*id).to_string())
        .unwrap_or(lowered);

    CoinId(canonical)
}
