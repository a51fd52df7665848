use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::state::StateCodec;
use crate::config::ProviderSettings;
use crate::error::AuthError;
use crate::items::IntegrationItem;

/// A set of tokens returned from a provider after code exchange or refresh.
///
/// Fields other than the three the gateway reads are kept verbatim in
/// `extra` so the credential blob handed to clients is the provider's own
/// response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// How client credentials are presented to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// `Authorization: Basic base64(client_id:client_secret)`
    Basic,
    /// `client_id` / `client_secret` form fields
    Body,
}

/// Trait that every OAuth provider must implement.
///
/// The protocol steps (authorize URL, code exchange, refresh) have default
/// implementations driven by [`ProviderSettings`]; a provider only states its
/// quirks and how to list its resources.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Unique provider identifier (e.g., "notion", "hubspot").
    fn id(&self) -> &str;

    /// Human-readable display name (e.g., "Notion", "HubSpot").
    fn display_name(&self) -> &str;

    fn settings(&self) -> &ProviderSettings;

    /// Shared HTTP client, already configured with the outbound timeout.
    fn http(&self) -> &reqwest::Client;

    fn state_codec(&self) -> StateCodec;

    fn client_auth(&self) -> ClientAuth {
        ClientAuth::Body
    }

    /// Whether this provider requires PKCE (Proof Key for Code Exchange).
    fn supports_pkce(&self) -> bool {
        false
    }

    /// Provider specific query parameters for the authorize URL.
    fn extra_auth_params(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Build the authorization URL that the user should be redirected to.
    fn auth_url(&self, state: &str, code_challenge: Option<&str>) -> String {
        let settings = self.settings();
        let mut params: Vec<(&str, String)> = vec![
            ("client_id", settings.client_id.clone()),
            ("redirect_uri", settings.redirect_uri.clone()),
            ("response_type", "code".into()),
        ];
        if let Some(scopes) = &settings.scopes {
            params.push(("scope", scopes.clone()));
        }
        params.push(("state", state.to_string()));
        if let Some(challenge) = code_challenge {
            params.push(("code_challenge", challenge.to_string()));
            params.push(("code_challenge_method", "S256".into()));
        }
        params.extend(self.extra_auth_params());

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", settings.authorize_url)
    }

    /// Exchange an authorization code for an access token (and optionally refresh token).
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet, AuthError> {
        let redirect_uri = self.settings().redirect_uri.clone();
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }
        request_token(self.http(), self.settings(), self.client_auth(), &form).await
    }

    /// Refresh an expired access token using a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        request_token(self.http(), self.settings(), self.client_auth(), &form)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))
    }

    /// List the provider's resources visible to `access_token`.
    ///
    /// Endpoints that fail are logged and skipped, so the result may be partial.
    async fn fetch_items(&self, access_token: &str) -> Vec<IntegrationItem>;
}

/// POST a form to the provider's token endpoint and parse the token response.
///
/// Transport failures, timeouts, non-2xx statuses and bodies without an
/// `access_token` all become [`AuthError::TokenExchangeFailed`].
pub async fn request_token(
    http: &reqwest::Client,
    settings: &ProviderSettings,
    auth: ClientAuth,
    form: &[(&str, &str)],
) -> Result<TokenSet, AuthError> {
    let mut fields: Vec<(&str, &str)> = form.to_vec();
    let mut req = http.post(&settings.token_url);
    match auth {
        ClientAuth::Basic => {
            req = req.basic_auth(&settings.client_id, Some(&settings.client_secret));
        }
        ClientAuth::Body => {
            fields.push(("client_id", settings.client_id.as_str()));
            fields.push(("client_secret", settings.client_secret.as_str()));
        }
    }

    let resp = req
        .form(&fields)
        .send()
        .await
        .map_err(|e| AuthError::TokenExchangeFailed {
            status: None,
            body: format!("token request failed: {e}"),
        })?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(AuthError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            body,
        });
    }

    let mut tokens =
        serde_json::from_str::<TokenSet>(&body).map_err(|e| AuthError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            body: format!("unparseable token response: {e}"),
        })?;
    // a negative lifetime means already expired
    tokens.expires_in = tokens.expires_in.map(|secs| secs.max(0));
    Ok(tokens)
}
