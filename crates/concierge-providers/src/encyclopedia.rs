use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use concierge_core::config::ProvidersConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::Provider;

use crate::http::{get_json, required_str};

/// Max search hits requested.
pub const SEARCH_LIMIT: usize = 5;

/// Search and page extracts from a MediaWiki instance.
///
/// Two request shapes:
/// - `{"query": "..."}` returns `{"results": [title, ...]}`
/// - `{"title": "..."}` returns `{"title", "content", "url"}`; a missing page is an error.
pub struct EncyclopediaProvider {
    http: Client,
    base_url: String,
}

impl EncyclopediaProvider {
    pub fn new(http: Client, config: &ProvidersConfig) -> Self {
        let base_url = config
            .encyclopedia_url
            .replace("{lang}", &config.encyclopedia_lang)
            .trim_end_matches('/')
            .to_string();
        Self { http, base_url }
    }

    fn api(&self) -> String {
        format!("{}/w/api.php", self.base_url)
    }

    pub fn page_url(&self, title: &str) -> String {
        format!(
            "{}/wiki/{}",
            self.base_url,
            urlencoding::encode(&title.replace(' ', "_"))
        )
    }

    async fn search(&self, query: &str) -> Result<Value> {
        debug!(query, "Encyclopedia search");
        let limit = SEARCH_LIMIT.to_string();
        let req = self.http.get(self.api()).query(&[
            ("action", "query"),
            ("list", "search"),
            ("srsearch", query),
            ("srlimit", limit.as_str()),
            ("format", "json"),
        ]);
        let body = get_json(self.name(), req).await?;

        let results: Vec<String> = body
            .pointer("/query/search")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|h| h.get("title").and_then(Value::as_str))
                    .map(str::to_string)
                    .take(SEARCH_LIMIT)
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({ "results": results }))
    }

    async fn page(&self, title: &str) -> Result<Value> {
        debug!(title, "Encyclopedia page fetch");
        let req = self.http.get(self.api()).query(&[
            ("action", "query"),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("titles", title),
            ("format", "json"),
        ]);
        let body = get_json(self.name(), req).await?;

        let page = body
            .pointer("/query/pages")
            .and_then(Value::as_object)
            .and_then(|pages| pages.values().next())
            .filter(|p| p.get("missing").is_none())
            .ok_or_else(|| ConciergeError::provider(self.name(), format!("page '{}' not found", title)))?;

        let content = page.get("extract").and_then(Value::as_str).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ConciergeError::provider(self.name(), format!("page '{}' is empty", title)));
        }
        let resolved = page.get("title").and_then(Value::as_str).unwrap_or(title);
        Ok(json!({
            "title": resolved,
            "content": content,
            "url": self.page_url(resolved),
        }))
    }
}

impl Provider for EncyclopediaProvider {
    fn name(&self) -> &str {
        "encyclopedia"
    }

    fn description(&self) -> &str {
        "Encyclopedia search and plain-text page extracts"
    }

    fn fetch(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            if input.get("title").is_some() {
                let title = required_str(&input, "title")?.to_string();
                self.page(&title).await
            } else {
                let query = required_str(&input, "query")?.to_string();
                self.search(&query).await
            }
        })
    }
}
