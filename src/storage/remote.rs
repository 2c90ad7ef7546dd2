//! Hosted table backend.
//!
//! Talks to a PostgREST-style table API (`<url>/rest/v1/<table>`), which is how
//! managed backends expose their tables over HTTP. The service assigns `id` and
//! `created_at` itself; `created_at` must be a `timestamptz` column.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::Deserialize;

use super::{CommentStore, StoreError, StoreResult};
use crate::model::{Comment, NewComment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestTableConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Service or anon key sent as both `apikey` and bearer token.
    pub api_key: String,
    pub table: String,
}

#[derive(Clone)]
pub struct RestTableStore {
    table_url: Url,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RestErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl RestTableStore {
    pub fn new(cfg: RestTableConfig) -> anyhow::Result<Self> {
        let base = cfg.url.trim_end_matches('/');
        let table_url = Url::parse(&format!("{}/rest/v1/{}", base, cfg.table))?;
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&cfg.api_key)?);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))?);
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { table_url, client })
    }

    pub fn table_url(&self) -> &Url { &self.table_url }
}

/// Turn a non-2xx response into a `StoreError` carrying the service's own message.
async fn error_from(resp: reqwest::Response) -> StoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<RestErrorBody>(&body).ok();
    let message = parsed
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| if body.is_empty() { format!("HTTP {}", status) } else { body });
    StoreError::new(message)
}

#[async_trait]
impl CommentStore for RestTableStore {
    async fn insert(&self, new: NewComment) -> StoreResult<Comment> {
        let resp = self
            .client
            .post(self.table_url.clone())
            .header("Prefer", "return=representation")
            .json(&[&new])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let mut rows: Vec<Comment> = resp.json().await?;
        if rows.is_empty() {
            return Err(StoreError::new("insert returned no rows"));
        }
        Ok(rows.swap_remove(0))
    }

    async fn list_ordered(&self) -> StoreResult<Vec<Comment>> {
        let mut url = self.table_url.clone();
        url.query_pairs_mut().append_pair("select", "*").append_pair("order", "created_at.asc");
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(resp.json().await?)
    }

    fn describe(&self) -> String { format!("rest:{}", self.table_url) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_url_is_built_from_base_and_table() {
        let store = RestTableStore::new(RestTableConfig {
            url: "https://abc.example.co/".into(),
            api_key: "k".into(),
            table: "comments".into(),
        })
        .unwrap();
        assert_eq!(store.table_url().as_str(), "https://abc.example.co/rest/v1/comments");
        assert_eq!(store.describe(), "rest:https://abc.example.co/rest/v1/comments");
    }

    #[test]
    fn rejects_unusable_key() {
        let err = RestTableStore::new(RestTableConfig {
            url: "https://abc.example.co".into(),
            api_key: "bad\nkey".into(),
            table: "comments".into(),
        });
        assert!(err.is_err());
    }
}
