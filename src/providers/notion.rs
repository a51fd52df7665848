use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::state::StateCodec;
use super::traits::{ClientAuth, OAuthProvider};
use crate::config::ProviderSettings;
use crate::items::{parse_timestamp, IntegrationItem};

const NOTION_VERSION: &str = "2022-06-28";
const MAX_PAGES: usize = 20;

/// Notion public integration.
///
/// Client credentials go in HTTP Basic auth. Access tokens normally carry no
/// `expires_in`, so the refresh policy leaves them alone.
pub struct NotionProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<SearchResult>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: String,
    object: String,
    #[serde(default)]
    title: Vec<RichText>,
    url: Option<String>,
    created_time: Option<String>,
    last_edited_time: Option<String>,
    parent: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    plain_text: Option<String>,
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    content: Option<String>,
}

impl NotionProvider {
    pub fn new(settings: ProviderSettings, http: reqwest::Client) -> Self {
        Self { settings, http }
    }

    async fn search_page(&self, access_token: &str, cursor: Option<&str>) -> Option<SearchPage> {
        let mut body = json!({
            "filter": {"value": "database", "property": "object"},
            "page_size": 100,
        });
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }

        let resp = match self
            .http
            .post(format!("{}/v1/search", self.settings.api_base))
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("notion search failed: {e}");
                return None;
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("notion search error {status}: {body}");
            return None;
        }

        match resp.json::<SearchPage>().await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!("notion search returned an unreadable body: {e}");
                None
            }
        }
    }
}

fn to_item(result: &SearchResult) -> IntegrationItem {
    let name = result
        .title
        .first()
        .and_then(|t| {
            t.plain_text
                .clone()
                .or_else(|| t.text.as_ref().and_then(|c| c.content.clone()))
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| result.id.clone());

    let parent_id = result.parent.as_ref().and_then(|p| {
        let kind = p.get("type")?.as_str()?;
        p.get(kind)?.as_str().map(str::to_string)
    });

    let mut item = IntegrationItem::new(result.id.clone(), result.object.clone());
    item.name = Some(name);
    item.url = result.url.clone();
    item.parent_id = parent_id;
    item.creation_time = parse_timestamp(result.created_time.as_deref());
    item.last_modified_time = parse_timestamp(result.last_edited_time.as_deref());
    item
}

#[async_trait]
impl OAuthProvider for NotionProvider {
    fn id(&self) -> &str {
        "notion"
    }

    fn display_name(&self) -> &str {
        "Notion"
    }

    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn state_codec(&self) -> StateCodec {
        StateCodec::Delimited
    }

    fn client_auth(&self) -> ClientAuth {
        ClientAuth::Basic
    }

    fn extra_auth_params(&self) -> Vec<(&'static str, String)> {
        vec![("owner", "user".into())]
    }

    async fn fetch_items(&self, access_token: &str) -> Vec<IntegrationItem> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let Some(page) = self.search_page(access_token, cursor.as_deref()).await else {
                break;
            };
            items.extend(page.results.iter().map(to_item));

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(value: serde_json::Value) -> SearchResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_database_item() {
        let r = result(json!({
            "object": "database",
            "id": "db-1",
            "title": [{"plain_text": "Roadmap", "text": {"content": "Roadmap"}}],
            "url": "https://www.notion.so/db1",
            "created_time": "2024-01-01T00:00:00.000Z",
            "last_edited_time": "2024-01-05T00:00:00.000Z",
            "parent": {"type": "page_id", "page_id": "page-9"}
        }));
        let item = to_item(&r);
        assert_eq!(item.id, "db-1");
        assert_eq!(item.item_type, "database");
        assert_eq!(item.name.as_deref(), Some("Roadmap"));
        assert_eq!(item.url.as_deref(), Some("https://www.notion.so/db1"));
        assert_eq!(item.parent_id.as_deref(), Some("page-9"));
    }

    #[test]
    fn test_untitled_database_uses_id() {
        let r = result(json!({"object": "database", "id": "db-2", "title": []}));
        assert_eq!(to_item(&r).name.as_deref(), Some("db-2"));

        let r = result(json!({"object": "database", "id": "db-3", "title": [{"text": {"content": "Fallback"}}]}));
        assert_eq!(to_item(&r).name.as_deref(), Some("Fallback"));
    }

    #[test]
    fn test_authorize_url_has_owner_and_no_scope() {
        let settings = ProviderSettings::with_defaults(&crate::config::NOTION, "cid", "secret", "http://cb");
        let provider = NotionProvider::new(settings, reqwest::Client::new());
        let url = provider.auth_url("notion:abc:u1:acme", None);
        assert!(url.starts_with("https://api.notion.com/v1/oauth/authorize?"));
        assert!(url.ends_with("&owner=user"));
        assert!(url.contains("state=notion%3Aabc%3Au1%3Aacme"));
        assert!(!url.contains("scope="));
    }
}
