//! Per-provider OAuth flow controller.
//!
//! Lifecycle per identity:
//! `UNSTARTED -> STATE_ISSUED -> CODE_EXCHANGED -> CREDENTIALS_CONSUMED`.
//! Transient entries expire after ten minutes, which drops the identity back
//! to `UNSTARTED`.

mod consumer;
mod gateway;

pub use gateway::Gateway;

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::crypto::{random_token, Pkce};
use crate::error::AuthError;
use crate::providers::{OAuthProvider, TokenSet};
use crate::store::{KeyValueStore, TokenStore, TokenUpsert};

/// Lifetime of an issued state token and its PKCE verifier.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Lifetime of exchanged credentials waiting for pickup.
pub const CREDENTIALS_TTL: Duration = Duration::from_secs(600);

/// Bytes of entropy in each state nonce.
const STATE_NONCE_BYTES: usize = 24;

/// Page served to the popup window once the code has been exchanged.
pub const CALLBACK_CLOSE_HTML: &str =
    "<html><body><script>window.close();</script>Authorization complete.</body></html>";

/// Token endpoint response tagged with the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBlob {
    #[serde(flatten)]
    pub tokens: TokenSet,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub org_id: String,
}

/// OAuth flow for one provider.
pub struct OAuthFlow {
    provider: Arc<dyn OAuthProvider>,
    transient: Arc<dyn KeyValueStore>,
    tokens: TokenStore,
}

impl OAuthFlow {
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        transient: Arc<dyn KeyValueStore>,
        tokens: TokenStore,
    ) -> Self {
        Self {
            provider,
            transient,
            tokens,
        }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    /// `{provider}_{kind}:{org_id}:{user_id}` with percent-encoded ids, so ids
    /// containing `:` cannot collide with another identity's key.
    fn key(&self, kind: &str, user_id: &str, org_id: &str) -> String {
        format!(
            "{}_{kind}:{}:{}",
            self.provider.id(),
            urlencoding::encode(org_id),
            urlencoding::encode(user_id)
        )
    }

    fn state_key(&self, user_id: &str, org_id: &str) -> String {
        self.key("state", user_id, org_id)
    }

    fn verifier_key(&self, user_id: &str, org_id: &str) -> String {
        self.key("verifier", user_id, org_id)
    }

    fn credentials_key(&self, user_id: &str, org_id: &str) -> String {
        self.key("credentials", user_id, org_id)
    }

    /// Issue a fresh state token and return the provider's authorize URL.
    ///
    /// A new call for the same identity replaces the pending state, so links
    /// from older tabs stop working.
    pub async fn authorize(&self, user_id: &str, org_id: &str) -> Result<String, AuthError> {
        if user_id.is_empty() || org_id.is_empty() {
            return Err(AuthError::InvalidRequest(
                "user_id and org_id are required".into(),
            ));
        }

        let provider_id = self.provider.id();
        let nonce = random_token(STATE_NONCE_BYTES);
        let state = self
            .provider
            .state_codec()
            .encode(provider_id, &nonce, user_id, org_id);

        self.transient
            .put(&self.state_key(user_id, org_id), &state, Some(STATE_TTL))
            .await?;

        let challenge = if self.provider.supports_pkce() {
            let pkce = Pkce::generate();
            self.transient
                .put(
                    &self.verifier_key(user_id, org_id),
                    &pkce.verifier,
                    Some(STATE_TTL),
                )
                .await?;
            Some(pkce.challenge)
        } else {
            None
        };

        info!("{provider_id} authorization started for {org_id}/{user_id}");
        Ok(self.provider.auth_url(&state, challenge.as_deref()))
    }

    /// Validate the provider redirect, exchange the code and persist the tokens.
    ///
    /// Returns the fixed self-closing HTML page on success.
    pub async fn oauth_callback(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<String, AuthError> {
        let provider_id = self.provider.id();

        if let Some(error) = query.get("error") {
            let detail = query
                .get("error_description")
                .filter(|d| !d.is_empty())
                .unwrap_or(error);
            warn!("{provider_id} authorization denied: {detail}");
            return Err(AuthError::InvalidRequest(detail.clone()));
        }

        let (Some(code), Some(state)) = (
            query.get("code").filter(|c| !c.is_empty()),
            query.get("state").filter(|s| !s.is_empty()),
        ) else {
            return Err(AuthError::InvalidRequest("missing code or state".into()));
        };

        let identity = self
            .provider
            .state_codec()
            .decode(provider_id, state)
            .inspect_err(|_| warn!("{provider_id} callback with undecodable state (possible CSRF)"))?;
        let (user_id, org_id) = (identity.user_id.as_str(), identity.org_id.as_str());

        // single use: only the exact stored value is consumed
        let state_key = self.state_key(user_id, org_id);
        if !self.transient.delete_if_eq(&state_key, state).await? {
            warn!(
                "{provider_id} callback state mismatch or expired for {org_id}/{user_id} \
                 (possible CSRF or replay)"
            );
            return Err(AuthError::InvalidState);
        }

        let verifier = if self.provider.supports_pkce() {
            let verifier = self
                .transient
                .take(&self.verifier_key(user_id, org_id))
                .await?;
            if verifier.is_none() {
                warn!("{provider_id} PKCE verifier missing for {org_id}/{user_id}");
                return Err(AuthError::InvalidState);
            }
            verifier
        } else {
            None
        };

        let tokens = self
            .provider
            .exchange_code(code, verifier.as_deref())
            .await
            .inspect_err(|e| warn!("{provider_id} code exchange failed for {org_id}/{user_id}: {e}"))?;

        let blob = CredentialBlob {
            tokens,
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
        };
        let raw = serde_json::to_string(&blob)
            .map_err(|e| AuthError::Internal(format!("failed to serialize credentials: {e}")))?;

        self.transient
            .put(&self.credentials_key(user_id, org_id), &raw, Some(CREDENTIALS_TTL))
            .await?;

        self.tokens
            .upsert_tokens(&TokenUpsert {
                provider: provider_id.to_string(),
                user_id: user_id.to_string(),
                org_id: org_id.to_string(),
                access_token: blob.tokens.access_token.clone(),
                refresh_token: blob.tokens.refresh_token.clone(),
                expires_in: blob.tokens.expires_in,
            })
            .await?;

        self.audit(org_id, user_id, "oauth.connected", json!({})).await;
        info!("{provider_id} connected for {org_id}/{user_id}");

        Ok(CALLBACK_CLOSE_HTML.to_string())
    }

    /// Hand out the exchanged credentials exactly once.
    pub async fn get_credentials(
        &self,
        user_id: &str,
        org_id: &str,
    ) -> Result<CredentialBlob, AuthError> {
        let raw = self
            .transient
            .take(&self.credentials_key(user_id, org_id))
            .await?
            .ok_or_else(|| AuthError::NotFound("credentials".into()))?;

        serde_json::from_str(&raw)
            .map_err(|e| AuthError::Internal(format!("stored credentials are corrupt: {e}")))
    }

    /// Remove the stored connection for an identity.
    pub async fn disconnect(&self, user_id: &str, org_id: &str) -> Result<(), AuthError> {
        let provider_id = self.provider.id();
        self.tokens.delete_token(provider_id, user_id, org_id).await?;
        self.audit(org_id, user_id, "oauth.disconnected", json!({})).await;
        info!("{provider_id} disconnected for {org_id}/{user_id}");
        Ok(())
    }

    /// Audit failures are logged, never returned.
    async fn audit(&self, org_id: &str, user_id: &str, event_type: &str, metadata: serde_json::Value) {
        if let Err(e) = self
            .tokens
            .log_event(org_id, user_id, event_type, self.provider.id(), metadata)
            .await
        {
            warn!("failed to record {event_type} event: {e}");
        }
    }
}
