//! Solr transport backed by `reqwest`.
//!
//! Solr applies writes inline (`commit=true`), so every write returns a settled
//! [`TaskHandle`] and task inspection is never needed. Schema management is
//! out of band: `update_settings` only logs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use searchsync_core::config::{BackendKind, EngineConfig};
use searchsync_core::document::{parse_record_id, Document, RecordId};
use searchsync_core::error::SyncError;
use searchsync_core::query::{FacetedDialect, Page, QueryBuilder, SearchQuery, SearchResponse};
use searchsync_core::settings::IndexSettings;
use searchsync_core::task::{Task, TaskHandle, TaskStatus};
use searchsync_core::transport::{IdPage, IndexBackend, IndexInfo, ScanCursor};

use crate::common::{build_http, error_body, transport_error};

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct CoreStatus {
    #[serde(default)]
    status: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSet {
    num_found: u64,
    #[serde(default)]
    start: u64,
    #[serde(default)]
    docs: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FacetCounts {
    #[serde(default)]
    facet_fields: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectBody {
    response: ResultSet,
    #[serde(default, rename = "facet_counts")]
    facet_counts: FacetCounts,
    #[serde(default)]
    next_cursor_mark: Option<String>,
}

/// Solr HTTP client. Index names map to core names.
pub struct SolrBackend {
    base_url: String,
    http: reqwest::Client,
}

impl SolrBackend {
    /// Fails with [`SyncError::NotConfigured`] when the URL is missing or invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, SyncError> {
        Ok(Self {
            http: build_http(config)?,
            base_url: config.base_url().to_string(),
        })
    }

    async fn send<T: DeserializeOwned>(&self, rb: reqwest::RequestBuilder) -> Result<T, SyncError> {
        let resp = rb.send().await.map_err(transport_error)?;
        if !resp.status().is_success() {
            let (status, body) = error_body(resp).await;
            let msg = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.msg)
                .unwrap_or(body);
            return Err(SyncError::Backend(format!("HTTP {status}: {msg}")));
        }
        resp.json::<T>().await.map_err(transport_error)
    }

    async fn update(&self, core: &str, body: &Value) -> Result<(), SyncError> {
        let _: Value = self
            .send(
                self.http
                    .post(format!("{}/{core}/update", self.base_url))
                    .query(&[("commit", "true"), ("wt", "json")])
                    .json(body),
            )
            .await?;
        Ok(())
    }

    async fn select(&self, core: &str, query: &SearchQuery) -> Result<SelectBody, SyncError> {
        let params = query.render(&FacetedDialect).params;
        self.send(
            self.http
                .get(format!("{}/{core}/select", self.base_url))
                .query(&params),
        )
        .await
    }
}

/// Solr returns facet counts as a flat `[value, count, value, count, ...]` list.
fn facet_pairs(flat: &[Value]) -> BTreeMap<String, u64> {
    flat.chunks(2)
        .filter_map(|pair| match pair {
            [value, count] => {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                count.as_u64().map(|c| (value, c))
            }
            _ => None,
        })
        .collect()
}

#[async_trait]
impl IndexBackend for SolrBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Solr
    }

    fn url(&self) -> &str {
        &self.base_url
    }

    async fn get_index(&self, index: &str) -> Result<Option<IndexInfo>, SyncError> {
        let status: CoreStatus = self
            .send(
                self.http
                    .get(format!("{}/admin/cores", self.base_url))
                    .query(&[("action", "STATUS"), ("core", index), ("wt", "json")]),
            )
            .await?;
        // An unknown core comes back as an empty object, not a 404.
        let present = status
            .status
            .get(index)
            .and_then(Value::as_object)
            .is_some_and(|core| !core.is_empty());
        Ok(present.then(|| IndexInfo {
            uid: index.to_string(),
            primary_key: None,
        }))
    }

    async fn create_index(&self, index: &str, _primary_key: &str) -> Result<TaskHandle, SyncError> {
        let _: Value = self
            .send(
                self.http
                    .get(format!("{}/admin/cores", self.base_url))
                    .query(&[
                        ("action", "CREATE"),
                        ("name", index),
                        ("configSet", "_default"),
                        ("wt", "json"),
                    ]),
            )
            .await?;
        Ok(TaskHandle::settled(index, "indexCreation"))
    }

    async fn update_settings(
        &self,
        index: &str,
        _settings: &IndexSettings,
    ) -> Result<TaskHandle, SyncError> {
        tracing::debug!(index, "solr schema is managed by the configset; settings not applied");
        Ok(TaskHandle::settled(index, "settingsUpdate"))
    }

    async fn add_documents(
        &self,
        index: &str,
        primary_key: &str,
        docs: &[Document],
    ) -> Result<TaskHandle, SyncError> {
        let body = Value::Array(docs.iter().map(|d| d.to_json(primary_key)).collect());
        self.update(index, &body).await?;
        Ok(TaskHandle::settled(index, "documentAdditionOrUpdate"))
    }

    async fn delete_document(&self, index: &str, id: RecordId) -> Result<TaskHandle, SyncError> {
        let body = serde_json::json!({ "delete": { "id": id.to_string() } });
        self.update(index, &body).await?;
        Ok(TaskHandle::settled(index, "documentDeletion"))
    }

    async fn get_task(&self, uid: u64) -> Result<Task, SyncError> {
        Err(SyncError::Backend(format!(
            "solr has no task queue (asked for task {uid})"
        )))
    }

    async fn delete_tasks(&self, _statuses: &[TaskStatus]) -> Result<TaskHandle, SyncError> {
        Ok(TaskHandle::settled("", "taskDeletion"))
    }

    async fn fetch_ids(
        &self,
        index: &str,
        primary_key: &str,
        cursor: &ScanCursor,
        limit: u64,
    ) -> Result<IdPage, SyncError> {
        let mark = match cursor {
            ScanCursor::Start => Page::CURSOR_START.to_string(),
            ScanCursor::Token(t) => t.clone(),
            ScanCursor::Offset(_) => {
                return Err(SyncError::Backend(
                    "solr scans use cursor marks, not offsets".into(),
                ))
            }
        };
        let query = QueryBuilder::new()
            .with_primary_key(primary_key)
            .set_ordering(primary_key)
            .set_tie_breaker(vec![])
            .set_field_list([primary_key])
            .set_pagination(0, limit)
            .build(false, Some(&mark));
        let body = self.select(index, &query).await?;

        let mut ids = Vec::with_capacity(body.response.docs.len());
        for doc in &body.response.docs {
            match doc.get(primary_key).and_then(parse_record_id) {
                Some(id) => ids.push(id),
                None => tracing::warn!(index, doc = %doc, "skipping document without a numeric id"),
            }
        }
        // The same mark coming back means the scan is exhausted.
        let next = body
            .next_cursor_mark
            .filter(|next| *next != mark && !body.response.docs.is_empty())
            .map(ScanCursor::Token);
        Ok(IdPage {
            ids,
            next,
            total: Some(body.response.num_found),
        })
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResponse, SyncError> {
        let body = self.select(index, query).await?;
        let next_cursor = match &query.page {
            Page::Cursor { cursor, .. } => body.next_cursor_mark.filter(|next| next != cursor),
            Page::Offset { .. } => None,
        };
        Ok(SearchResponse {
            total_hits: body.response.num_found,
            offset: body.response.start,
            limit: query.page.limit(),
            hits: body.response.docs,
            facets: body
                .facet_counts
                .facet_fields
                .iter()
                .map(|(field, flat)| (field.clone(), facet_pairs(flat)))
                .collect(),
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn facet_pairs_are_zipped() {
        let flat = vec![json!("DE"), json!(3), json!("FR"), json!(1), json!("dangling")];
        let pairs = facet_pairs(&flat);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["DE"], 3);
        assert_eq!(pairs["FR"], 1);
    }

    #[test]
    fn select_body_parses_facets_and_cursor() {
        let raw = json!({
            "response": { "numFound": 2, "start": 0, "docs": [{"id": "1"}, {"id": "2"}] },
            "facet_counts": { "facet_fields": { "country": ["DE", 2] } },
            "nextCursorMark": "AoE"
        });
        let body: SelectBody = serde_json::from_value(raw).unwrap();
        assert_eq!(body.response.num_found, 2);
        assert_eq!(body.next_cursor_mark.as_deref(), Some("AoE"));
        assert_eq!(facet_pairs(&body.facet_counts.facet_fields["country"])["DE"], 2);
    }

    #[tokio::test]
    async fn writes_without_task_queue_report_no_task() {
        let backend = SolrBackend::new(&EngineConfig::new("http://localhost:8983/solr")).unwrap();
        assert!(backend.get_task(1).await.is_err());
        assert!(backend.delete_tasks(&TaskStatus::ALL).await.unwrap().is_settled());
    }
}
