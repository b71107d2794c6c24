//! Meilisearch transport backed by `reqwest`.
//!
//! Every write is enqueued as a task and answered with `202 Accepted` plus a
//! summarized task; completion is observed through `GET /tasks/{uid}`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use searchsync_core::config::{BackendKind, EngineConfig};
use searchsync_core::document::{parse_record_id, Document, RecordId};
use searchsync_core::error::SyncError;
use searchsync_core::query::{FilterDialect, Page, SearchQuery, SearchResponse};
use searchsync_core::settings::IndexSettings;
use searchsync_core::task::{Task, TaskHandle, TaskStatus};
use searchsync_core::transport::{IdPage, IndexBackend, IndexInfo, ScanCursor};

use crate::common::{build_http, error_body, transport_error};

/// Error body returned with every non-2xx response.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct DocumentsPage {
    results: Vec<Value>,
    offset: u64,
    limit: u64,
    total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    hits: Vec<Value>,
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    estimated_total_hits: Option<u64>,
    #[serde(default)]
    total_hits: Option<u64>,
    #[serde(default)]
    facet_distribution: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Meilisearch HTTP client.
pub struct MeiliBackend {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl MeiliBackend {
    /// Fails with [`SyncError::NotConfigured`] when the URL is missing or invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, SyncError> {
        Ok(Self {
            http: build_http(config)?,
            base_url: config.base_url().to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let rb = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => rb.bearer_auth(key),
            None => rb,
        }
    }

    async fn send<T: DeserializeOwned>(&self, rb: reqwest::RequestBuilder) -> Result<T, SyncError> {
        let resp = rb.send().await.map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        resp.json::<T>().await.map_err(transport_error)
    }
}

async fn api_error(resp: reqwest::Response) -> SyncError {
    let (status, body) = error_body(resp).await;
    match serde_json::from_str::<ApiError>(&body) {
        Ok(e) => SyncError::Backend(format!("HTTP {status} {}: {}", e.code, e.message)),
        Err(_) => SyncError::Backend(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl IndexBackend for MeiliBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Meilisearch
    }

    fn url(&self) -> &str {
        &self.base_url
    }

    async fn get_index(&self, index: &str) -> Result<Option<IndexInfo>, SyncError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/indexes/{index}"))
            .send()
            .await
            .map_err(transport_error)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            let (status, body) = error_body(resp).await;
            return match serde_json::from_str::<ApiError>(&body) {
                Ok(e) if e.code == "index_not_found" => Ok(None),
                Ok(e) => Err(SyncError::Backend(format!("HTTP {status} {}: {}", e.code, e.message))),
                Err(_) => Err(SyncError::Backend(format!("HTTP {status}: {body}"))),
            };
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        resp.json::<IndexInfo>().await.map(Some).map_err(transport_error)
    }

    async fn create_index(&self, index: &str, primary_key: &str) -> Result<TaskHandle, SyncError> {
        let body = serde_json::json!({ "uid": index, "primaryKey": primary_key });
        self.send(self.request(reqwest::Method::POST, "/indexes").json(&body))
            .await
    }

    async fn update_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<TaskHandle, SyncError> {
        let path = format!("/indexes/{index}/settings");
        self.send(self.request(reqwest::Method::PATCH, &path).json(settings))
            .await
    }

    async fn add_documents(
        &self,
        index: &str,
        primary_key: &str,
        docs: &[Document],
    ) -> Result<TaskHandle, SyncError> {
        let body: Vec<Value> = docs.iter().map(|d| d.to_json(primary_key)).collect();
        let path = format!("/indexes/{index}/documents");
        self.send(
            self.request(reqwest::Method::POST, &path)
                .query(&[("primaryKey", primary_key)])
                .json(&body),
        )
        .await
    }

    async fn delete_document(&self, index: &str, id: RecordId) -> Result<TaskHandle, SyncError> {
        let path = format!("/indexes/{index}/documents/{id}");
        self.send(self.request(reqwest::Method::DELETE, &path)).await
    }

    async fn get_task(&self, uid: u64) -> Result<Task, SyncError> {
        self.send(self.request(reqwest::Method::GET, &format!("/tasks/{uid}")))
            .await
    }

    async fn delete_tasks(&self, statuses: &[TaskStatus]) -> Result<TaskHandle, SyncError> {
        let statuses = statuses
            .iter()
            .map(TaskStatus::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.send(
            self.request(reqwest::Method::DELETE, "/tasks")
                .query(&[("statuses", statuses)]),
        )
        .await
    }

    async fn fetch_ids(
        &self,
        index: &str,
        primary_key: &str,
        cursor: &ScanCursor,
        limit: u64,
    ) -> Result<IdPage, SyncError> {
        let offset = match cursor {
            ScanCursor::Start => 0,
            ScanCursor::Offset(o) => *o,
            ScanCursor::Token(t) => t
                .parse()
                .map_err(|_| SyncError::Backend(format!("invalid scan cursor '{t}'")))?,
        };
        let path = format!("/indexes/{index}/documents");
        let page: DocumentsPage = self
            .send(self.request(reqwest::Method::GET, &path).query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("fields", primary_key.to_string()),
            ]))
            .await?;

        let mut ids = Vec::with_capacity(page.results.len());
        for doc in &page.results {
            match doc.get(primary_key).and_then(parse_record_id) {
                Some(id) => ids.push(id),
                None => tracing::warn!(index, doc = %doc, "skipping document without a numeric id"),
            }
        }
        let next = (!page.results.is_empty() && page.offset + page.limit < page.total)
            .then(|| ScanCursor::Offset(page.offset + page.limit));
        Ok(IdPage {
            ids,
            next,
            total: Some(page.total),
        })
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResponse, SyncError> {
        let body = query.render(&FilterDialect);
        let path = format!("/indexes/{index}/search");
        let raw: SearchBody = self
            .send(self.request(reqwest::Method::POST, &path).json(&body))
            .await?;

        let mut out = SearchResponse {
            total_hits: raw.total_hits.or(raw.estimated_total_hits).unwrap_or(0),
            offset: raw.offset,
            limit: raw.limit,
            hits: raw.hits,
            facets: raw.facet_distribution,
            next_cursor: None,
        };
        if matches!(query.page, Page::Cursor { .. }) {
            out.next_cursor = out.next_offset().map(|o| o.to_string());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_requires_url() {
        let err = MeiliBackend::new(&EngineConfig::default()).err().unwrap();
        assert!(matches!(err, SyncError::NotConfigured(_)));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = MeiliBackend::new(&EngineConfig::new("http://localhost:7700/")).unwrap();
        assert_eq!(backend.url(), "http://localhost:7700");
    }
}
