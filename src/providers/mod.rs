mod airtable;
mod hubspot;
mod notion;
mod registry;
mod state;
mod traits;

pub use airtable::AirtableProvider;
pub use hubspot::HubSpotProvider;
pub use notion::NotionProvider;
pub use registry::ProviderRegistry;
pub use state::{StateCodec, StateIdentity};
pub use traits::{request_token, ClientAuth, OAuthProvider, TokenSet};

use std::sync::Arc;

use crate::config::Config;

/// Register every provider that has credentials configured.
pub fn register_defaults(registry: &mut ProviderRegistry, config: &Config, http: &reqwest::Client) {
    if let Some(settings) = &config.airtable {
        registry.register(Arc::new(AirtableProvider::new(settings.clone(), http.clone())));
    }

    if let Some(settings) = &config.notion {
        registry.register(Arc::new(NotionProvider::new(settings.clone(), http.clone())));
    }

    if let Some(settings) = &config.hubspot {
        registry.register(Arc::new(HubSpotProvider::new(settings.clone(), http.clone())));
    }
}
