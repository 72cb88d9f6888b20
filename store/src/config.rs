use std::path::PathBuf;

/// Configuration for the user store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Create an empty record the first time an unknown user is seen
    pub auto_provision: bool,
    /// JSON file the in-memory state is loaded from and written back to
    pub snapshot_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auto_provision: true,
            snapshot_path: None,
        }
    }
}

impl StoreConfig {
    /// Create a new store configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let auto_provision = match std::env::var("STORE_AUTO_PROVISION") {
            Ok(value) => value
                .parse::<bool>()
                .map_err(|_| format!("STORE_AUTO_PROVISION must be true or false, got '{}'", value))?,
            Err(_) => true,
        };
        let snapshot_path = std::env::var("STORE_SNAPSHOT_PATH")
            .ok()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            auto_provision,
            snapshot_path,
        })
    }
}
