use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::state::StateCodec;
use super::traits::OAuthProvider;
use crate::config::ProviderSettings;
use crate::items::{parse_timestamp, IntegrationItem};

/// CRM objects listed by `fetch_items`: (path, item type, requested properties).
const CRM_OBJECTS: [(&str, &str, &str); 3] = [
    ("contacts", "Contact", "email,firstname,lastname"),
    ("companies", "Company", "name,domain"),
    ("deals", "Deal", "dealname,amount,dealstage"),
];

const PAGE_LIMIT: &str = "10";

/// HubSpot OAuth 2.0 provider.
///
/// Client credentials go in the token request body.
/// Token lifetime: 30 minutes, refresh tokens do not rotate.
pub struct HubSpotProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CrmPage {
    #[serde(default)]
    results: Vec<CrmObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrmObject {
    id: String,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl HubSpotProvider {
    pub fn new(settings: ProviderSettings, http: reqwest::Client) -> Self {
        Self { settings, http }
    }

    async fn fetch_objects(&self, path: &str, properties: &str, access_token: &str) -> Option<CrmPage> {
        let url = format!("{}/crm/v3/objects/{path}", self.settings.api_base);
        let resp = match self
            .http
            .get(&url)
            .query(&[("limit", PAGE_LIMIT), ("properties", properties)])
            .bearer_auth(access_token)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("hubspot fetch {path} failed: {e}");
                return None;
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("hubspot {path} error {status}: {body}");
            return None;
        }

        match resp.json::<CrmPage>().await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!("hubspot {path} returned an unreadable body: {e}");
                None
            }
        }
    }
}

fn property<'a>(obj: &'a CrmObject, key: &str) -> Option<&'a str> {
    obj.properties
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn to_item(obj: &CrmObject, item_type: &str) -> IntegrationItem {
    let name = property(obj, "firstname")
        .or_else(|| property(obj, "name"))
        .or_else(|| property(obj, "dealname"))
        .or_else(|| property(obj, "lastname"))
        .unwrap_or(obj.id.as_str());

    let mut item = IntegrationItem::new(format!("{}_{item_type}", obj.id), item_type);
    item.name = Some(name.to_string());
    item.creation_time = parse_timestamp(obj.created_at.as_deref());
    item.last_modified_time = parse_timestamp(obj.updated_at.as_deref());
    item
}

#[async_trait]
impl OAuthProvider for HubSpotProvider {
    fn id(&self) -> &str {
        "hubspot"
    }

    fn display_name(&self) -> &str {
        "HubSpot"
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

    async fn fetch_items(&self, access_token: &str) -> Vec<IntegrationItem> {
        let mut items = Vec::new();
        for (path, item_type, properties) in CRM_OBJECTS {
            if let Some(page) = self.fetch_objects(path, properties, access_token).await {
                items.extend(page.results.iter().map(|obj| to_item(obj, item_type)));
            }
        }
        debug!("hubspot items: {}", items.len());
        items
    }
}
