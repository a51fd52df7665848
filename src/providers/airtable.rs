use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::state::StateCodec;
use super::traits::{ClientAuth, OAuthProvider};
use crate::config::ProviderSettings;
use crate::items::IntegrationItem;

const MAX_BASE_PAGES: usize = 20;

/// Airtable OAuth 2.0 provider.
///
/// Requires PKCE (S256) on every authorization and HTTP Basic client auth.
/// Token lifetime: 60 minutes, refresh tokens rotate on every refresh.
pub struct AirtableProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BasesPage {
    #[serde(default)]
    bases: Vec<Base>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Base {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TablesPage {
    #[serde(default)]
    tables: Vec<Table>,
}

#[derive(Debug, Deserialize)]
struct Table {
    id: String,
    name: String,
}

impl AirtableProvider {
    pub fn new(settings: ProviderSettings, http: reqwest::Client) -> Self {
        Self { settings, http }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Option<T> {
        let resp = match self
            .http
            .get(url)
            .query(query)
            .bearer_auth(access_token)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("airtable fetch {what} failed: {e}");
                return None;
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("airtable {what} error {status}: {body}");
            return None;
        }

        match resp.json::<T>().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("airtable {what} returned an unreadable body: {e}");
                None
            }
        }
    }

    async fn list_bases(&self, access_token: &str) -> Vec<Base> {
        let url = format!("{}/v0/meta/bases", self.settings.api_base);
        let mut bases = Vec::new();
        let mut offset: Option<String> = None;

        for _ in 0..MAX_BASE_PAGES {
            let query: Vec<(&str, &str)> = offset.iter().map(|o| ("offset", o.as_str())).collect();
            let Some(page) = self
                .get_json::<BasesPage>("bases", &url, &query, access_token)
                .await
            else {
                break;
            };
            bases.extend(page.bases);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        bases
    }
}

fn base_item(base: &Base) -> IntegrationItem {
    let mut item = IntegrationItem::new(base.id.clone(), "Base");
    item.name = Some(base.name.clone());
    item.directory = true;
    item
}

fn table_item(table: &Table, base: &Base) -> IntegrationItem {
    let mut item = IntegrationItem::new(table.id.clone(), "Table");
    item.name = Some(table.name.clone());
    item.parent_id = Some(base.id.clone());
    item.parent_path_or_name = Some(base.name.clone());
    item
}

#[async_trait]
impl OAuthProvider for AirtableProvider {
    fn id(&self) -> &str {
        "airtable"
    }

    fn display_name(&self) -> &str {
        "Airtable"
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn state_codec(&self) -> StateCodec {
        StateCodec::EncodedJson
    }

    fn client_auth(&self) -> ClientAuth {
        ClientAuth::Basic
    }

    fn supports_pkce(&self) -> bool {
        true
    }

    async fn fetch_items(&self, access_token: &str) -> Vec<IntegrationItem> {
        let mut items = Vec::new();

        for base in self.list_bases(access_token).await {
            items.push(base_item(&base));

            let url = format!("{}/v0/meta/bases/{}/tables", self.settings.api_base, base.id);
            if let Some(page) = self
                .get_json::<TablesPage>("tables", &url, &[], access_token)
                .await
            {
                items.extend(page.tables.iter().map(|t| table_item(t, &base)));
            }
        }

        items
    }
}
