pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod flow;
pub mod items;
pub mod providers;
pub mod store;

pub use config::Config;
pub use error::AuthError;
pub use flow::{CredentialBlob, Gateway};
pub use items::IntegrationItem;

use std::sync::Arc;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub gateway: Gateway,
}

pub type SharedState = Arc<AppState>;

/// Build the outbound HTTP client shared by every provider.
pub fn http_client(config: &Config) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| AuthError::Internal(format!("failed to build HTTP client: {e}")))
}
