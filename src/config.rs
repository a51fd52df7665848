use anyhow::{Context, Result};
use std::fmt;
use std::time::Duration;

/// Which backend holds state tokens, PKCE verifiers and pending credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for TransientBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(TransientBackend::Memory),
            "sqlite" => Ok(TransientBackend::Sqlite),
            other => anyhow::bail!("unknown TRANSIENT_BACKEND {other:?} (expected memory or sqlite)"),
        }
    }
}

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    pub base_url: String,
    /// Origin of the browser frontend allowed by CORS.
    pub frontend_origin: String,

    // ── Storage ─────────────────────────────────────────────────────────
    /// SQLite connection string for the token table.
    pub database_url: String,
    pub transient_backend: TransientBackend,

    // ── Outbound HTTP ───────────────────────────────────────────────────
    pub http_timeout: Duration,

    // ── OAuth Provider Credentials ──────────────────────────────────────
    pub airtable: Option<ProviderSettings>,
    pub notion: Option<ProviderSettings>,
    pub hubspot: Option<ProviderSettings>,
}

/// Everything a flow controller needs to talk to one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Space separated scope string, omitted from the authorize URL when `None`.
    pub scopes: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    /// Base URL for resource calls (overridable for tests).
    pub api_base: String,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Provider endpoints that are fixed by the provider, not by the deployment.
pub struct ProviderDefaults {
    pub id: &'static str,
    pub env_prefix: &'static str,
    pub authorize_url: &'static str,
    pub token_url: &'static str,
    pub api_base: &'static str,
    pub scopes: Option<&'static str>,
}

pub const AIRTABLE: ProviderDefaults = ProviderDefaults {
    id: "airtable",
    env_prefix: "AIRTABLE",
    authorize_url: "https://airtable.com/oauth2/v1/authorize",
    token_url: "https://airtable.com/oauth2/v1/token",
    api_base: "https://api.airtable.com",
    scopes: Some("data.records:read data.records:write data.recordComments:read data.recordComments:write schema.bases:read schema.bases:write"),
};

pub const NOTION: ProviderDefaults = ProviderDefaults {
    id: "notion",
    env_prefix: "NOTION",
    authorize_url: "https://api.notion.com/v1/oauth/authorize",
    token_url: "https://api.notion.com/v1/oauth/token",
    api_base: "https://api.notion.com",
    scopes: None,
};

pub const HUBSPOT: ProviderDefaults = ProviderDefaults {
    id: "hubspot",
    env_prefix: "HUBSPOT",
    authorize_url: "https://app.hubspot.com/oauth/authorize",
    token_url: "https://api.hubapi.com/oauth/v1/token",
    api_base: "https://api.hubapi.com",
    scopes: Some("crm.objects.contacts.read crm.objects.companies.read crm.objects.deals.read"),
};

impl Config {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8000".into());

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .context("Invalid PORT")?,
            frontend_origin: std::env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://integrations.db".into()),
            transient_backend: std::env::var("TRANSIENT_BACKEND")
                .unwrap_or_else(|_| "memory".into())
                .parse()?,

            http_timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "15".into())
                    .parse()
                    .context("Invalid HTTP_TIMEOUT_SECS")?,
            ),

            airtable: ProviderSettings::from_env(&AIRTABLE, &base_url),
            notion: ProviderSettings::from_env(&NOTION, &base_url),
            hubspot: ProviderSettings::from_env(&HUBSPOT, &base_url),

            base_url,
        })
    }

    /// Get the OAuth callback URL for a specific provider.
    pub fn callback_url(base_url: &str, provider: &str) -> String {
        format!("{base_url}/integrations/{provider}/oauth2callback")
    }
}

impl ProviderSettings {
    /// Read `{PREFIX}_CLIENT_ID` and friends. Returns `None` unless both the
    /// client id and secret are set.
    pub fn from_env(defaults: &ProviderDefaults, base_url: &str) -> Option<Self> {
        let var = |suffix: &str| {
            std::env::var(format!("{}_{suffix}", defaults.env_prefix))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };

        let client_id = var("CLIENT_ID")?;
        let client_secret = var("CLIENT_SECRET")?;

        Some(ProviderSettings {
            client_id,
            client_secret,
            redirect_uri: var("REDIRECT_URI")
                .unwrap_or_else(|| Config::callback_url(base_url, defaults.id)),
            scopes: var("SCOPES").or_else(|| defaults.scopes.map(str::to_string)),
            authorize_url: defaults.authorize_url.to_string(),
            token_url: defaults.token_url.to_string(),
            api_base: defaults.api_base.to_string(),
        })
    }

    /// Settings with the provider's public endpoints and explicit credentials.
    pub fn with_defaults(
        defaults: &ProviderDefaults,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        ProviderSettings {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: defaults.scopes.map(str::to_string),
            authorize_url: defaults.authorize_url.to_string(),
            token_url: defaults.token_url.to_string(),
            api_base: defaults.api_base.to_string(),
        }
    }
}
