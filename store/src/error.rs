use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Snapshot read error: {0}")]
    SnapshotReadError(String),

    #[error("Snapshot write error: {0}")]
    SnapshotWriteError(String),

    #[error("Data conversion error: {0}")]
    ConversionError(String),
}

impl From<StoreError> for common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(user_id) => common::Error::UserNotFound(user_id),
            other => common::Error::InternalError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::ConversionError(err.to_string())
    }
}
