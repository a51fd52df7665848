//! Credential consumer: keeps the stored token fresh before resource calls.

use serde_json::json;
use tracing::{debug, info, warn};

use super::{CredentialBlob, OAuthFlow};
use crate::error::AuthError;
use crate::items::IntegrationItem;
use crate::store::{needs_refresh, TokenUpsert};

impl OAuthFlow {
    /// List the provider's resources for the identity in `credentials_json`.
    pub async fn get_items(&self, credentials_json: &str) -> Result<Vec<IntegrationItem>, AuthError> {
        let blob: CredentialBlob = serde_json::from_str(credentials_json)
            .map_err(|e| AuthError::InvalidRequest(format!("invalid credentials json: {e}")))?;

        if blob.tokens.access_token.is_empty() {
            return Err(AuthError::InvalidRequest("missing access token".into()));
        }

        let access_token = self.resolve_access_token(&blob).await?;
        let items = self.provider.fetch_items(&access_token).await;
        debug!(
            "{} listed {} items for {}/{}",
            self.provider.id(),
            items.len(),
            blob.org_id,
            blob.user_id
        );
        Ok(items)
    }

    /// Pick the bearer token for this call.
    ///
    /// The blob's own token is used unless the stored row is due and a refresh
    /// succeeds, in which case the fresh token replaces it for this call only.
    /// The stored access token is never handed to a caller that did not
    /// present a token itself.
    pub(crate) async fn resolve_access_token(&self, blob: &CredentialBlob) -> Result<String, AuthError> {
        let provider_id = self.provider.id();
        let (user_id, org_id) = (blob.user_id.as_str(), blob.org_id.as_str());

        let presented = blob.tokens.access_token.clone();

        let Some(row) = self.tokens.get_token(provider_id, user_id, org_id).await? else {
            return Ok(presented);
        };

        if !needs_refresh(Some(&row)) {
            return Ok(presented);
        }

        let Some(refresh_token) = row.refresh_token.as_deref() else {
            debug!("{provider_id} token for {org_id}/{user_id} is due but has no refresh token");
            return Ok(presented);
        };

        let fresh = match self.provider.refresh_token(refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("{provider_id} refresh failed for {org_id}/{user_id}, using presented token: {e}");
                return Ok(presented);
            }
        };

        let persisted = self
            .tokens
            .upsert_tokens(&TokenUpsert {
                provider: provider_id.to_string(),
                user_id: user_id.to_string(),
                org_id: org_id.to_string(),
                access_token: fresh.access_token.clone(),
                refresh_token: fresh.refresh_token.clone(),
                expires_in: fresh.expires_in,
            })
            .await;
        if let Err(e) = persisted {
            warn!("{provider_id} refreshed token for {org_id}/{user_id} could not be stored: {e}");
        }

        self.audit(org_id, user_id, "oauth.refreshed", json!({})).await;
        info!("Refreshed {provider_id} token for {org_id}/{user_id}");

        Ok(fresh.access_token)
    }
}
