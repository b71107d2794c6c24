//! The `IndexBackend` trait — the seam every search engine transport implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BackendKind;
use crate::document::{Document, RecordId};
use crate::error::SyncError;
use crate::query::{SearchQuery, SearchResponse};
use crate::settings::IndexSettings;
use crate::task::{Task, TaskHandle, TaskStatus};

/// Index metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub uid: String,
    #[serde(default)]
    pub primary_key: Option<String>,
}

/// Position in a full-index id scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCursor {
    /// First page, in whatever form the engine paginates.
    Start,
    Offset(u64),
    /// Opaque deep-pagination token.
    Token(String),
}

/// One page of ids from an index scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdPage {
    pub ids: Vec<RecordId>,
    /// `None` when this was the last page.
    pub next: Option<ScanCursor>,
    /// Total documents in the index, when the engine reports it.
    pub total: Option<u64>,
}

/// Transport to one search engine.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one instance is shared by every
/// indexer and reconciler in the process.
///
/// # Completion model
/// Writes return a [`TaskHandle`]. Engines that apply writes inline return a
/// settled handle (`uid == None`) and never need [`get_task`](Self::get_task).
#[async_trait]
pub trait IndexBackend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// The engine's base URL (for logs).
    fn url(&self) -> &str;

    /// `Ok(None)` when the index does not exist; any other failure is an error.
    async fn get_index(&self, index: &str) -> Result<Option<IndexInfo>, SyncError>;

    async fn create_index(&self, index: &str, primary_key: &str) -> Result<TaskHandle, SyncError>;

    async fn update_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<TaskHandle, SyncError>;

    /// Upsert (full overwrite) keyed by `primary_key`.
    async fn add_documents(
        &self,
        index: &str,
        primary_key: &str,
        docs: &[Document],
    ) -> Result<TaskHandle, SyncError>;

    async fn delete_document(&self, index: &str, id: RecordId) -> Result<TaskHandle, SyncError>;

    async fn get_task(&self, uid: u64) -> Result<Task, SyncError>;

    /// Bulk-delete finished task records with any of `statuses`.
    async fn delete_tasks(&self, statuses: &[TaskStatus]) -> Result<TaskHandle, SyncError>;

    /// Fetch one page of ids, read from the `primary_key` field, using the
    /// engine's native pagination.
    async fn fetch_ids(
        &self,
        index: &str,
        primary_key: &str,
        cursor: &ScanCursor,
        limit: u64,
    ) -> Result<IdPage, SyncError>;

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResponse, SyncError>;
}
