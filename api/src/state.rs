use crate::{auth::Authenticator, service::CryptoService};
use std::sync::Arc;

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CryptoService>,
    pub auth: Arc<dyn Authenticator>,
}
