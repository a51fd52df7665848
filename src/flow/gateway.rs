//! Provider-keyed entry points used by the HTTP layer.

use std::collections::HashMap;
use std::sync::Arc;

use super::{CredentialBlob, OAuthFlow};
use crate::error::AuthError;
use crate::items::IntegrationItem;
use crate::providers::ProviderRegistry;
use crate::store::{ConnectionInfo, KeyValueStore, TokenStore};

/// One [`OAuthFlow`] per registered provider, sharing both stores.
pub struct Gateway {
    flows: HashMap<String, OAuthFlow>,
    tokens: TokenStore,
}

impl Gateway {
    pub fn new(
        registry: &ProviderRegistry,
        transient: Arc<dyn KeyValueStore>,
        tokens: TokenStore,
    ) -> Self {
        let flows = registry
            .iter()
            .map(|provider| {
                (
                    provider.id().to_string(),
                    OAuthFlow::new(provider.clone(), transient.clone(), tokens.clone()),
                )
            })
            .collect();

        Self { flows, tokens }
    }

    pub fn flow(&self, provider: &str) -> Result<&OAuthFlow, AuthError> {
        self.flows
            .get(provider)
            .ok_or_else(|| AuthError::ProviderNotFound(provider.to_string()))
    }

    /// Registered provider ids, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.flows.keys().map(|k| k.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub async fn authorize(
        &self,
        provider: &str,
        user_id: &str,
        org_id: &str,
    ) -> Result<String, AuthError> {
        self.flow(provider)?.authorize(user_id, org_id).await
    }

    pub async fn oauth_callback(
        &self,
        provider: &str,
        query: &HashMap<String, String>,
    ) -> Result<String, AuthError> {
        self.flow(provider)?.oauth_callback(query).await
    }

    pub async fn consume_credentials(
        &self,
        provider: &str,
        user_id: &str,
        org_id: &str,
    ) -> Result<CredentialBlob, AuthError> {
        self.flow(provider)?.get_credentials(user_id, org_id).await
    }

    pub async fn list_items(
        &self,
        provider: &str,
        credentials_json: &str,
    ) -> Result<Vec<IntegrationItem>, AuthError> {
        self.flow(provider)?.get_items(credentials_json).await
    }

    /// Connected providers for an identity (no tokens).
    pub async fn list_connections(
        &self,
        user_id: &str,
        org_id: &str,
    ) -> Result<Vec<ConnectionInfo>, AuthError> {
        self.tokens.list_connections(user_id, org_id).await
    }

    pub async fn disconnect(
        &self,
        provider: &str,
        user_id: &str,
        org_id: &str,
    ) -> Result<(), AuthError> {
        self.flow(provider)?.disconnect(user_id, org_id).await
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }
}
