#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use integrations_auth::config::{ProviderSettings, AIRTABLE, HUBSPOT, NOTION};
use integrations_auth::providers::{
    AirtableProvider, HubSpotProvider, NotionProvider, OAuthProvider, ProviderRegistry,
};
use integrations_auth::store::{KeyValueStore, MemoryStore, TokenStore};
use integrations_auth::Gateway;
use wiremock::MockServer;

pub const TOKEN_PATH: &str = "/oauth/token";

pub struct Harness {
    pub gateway: Gateway,
    pub transient: Arc<MemoryStore>,
    pub server: MockServer,
}

/// Settings whose token endpoint and API base point at `server`.
pub fn settings(
    defaults: &integrations_auth::config::ProviderDefaults,
    server: &MockServer,
) -> ProviderSettings {
    let mut s = ProviderSettings::with_defaults(
        defaults,
        "cid",
        "secret",
        format!(
            "http://localhost:8000/integrations/{}/oauth2callback",
            defaults.id
        ),
    );
    s.token_url = format!("{}{TOKEN_PATH}", server.uri());
    s.api_base = server.uri();
    s
}

pub fn http(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder().timeout(timeout).build().unwrap()
}

pub async fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(15)).await
}

pub async fn harness_with_timeout(timeout: Duration) -> Harness {
    let server = MockServer::start().await;
    let client = http(timeout);

    let mut registry = ProviderRegistry::new();
    let providers: Vec<Arc<dyn OAuthProvider>> = vec![
        Arc::new(HubSpotProvider::new(settings(&HUBSPOT, &server), client.clone())),
        Arc::new(NotionProvider::new(settings(&NOTION, &server), client.clone())),
        Arc::new(AirtableProvider::new(settings(&AIRTABLE, &server), client.clone())),
    ];
    for p in providers {
        registry.register(p);
    }

    let tokens = TokenStore::connect("sqlite::memory:").await.unwrap();
    tokens.migrate().await.unwrap();

    let transient = Arc::new(MemoryStore::new());
    let shared: Arc<dyn KeyValueStore> = transient.clone();
    let gateway = Gateway::new(&registry, shared, tokens);

    Harness {
        gateway,
        transient,
        server,
    }
}

/// Pull one query parameter (decoded) out of an authorize URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| urlencoding::decode(v).unwrap().into_owned())
    })
}

pub fn callback_query(code: &str, state: &str) -> HashMap<String, String> {
    HashMap::from([
        ("code".to_string(), code.to_string()),
        ("state".to_string(), state.to_string()),
    ])
}
