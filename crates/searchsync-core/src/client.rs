//! `IndexClient` — uniform write/wait surface over any [`IndexBackend`].
//!
//! Every write returns a [`TaskHandle`]; [`IndexClient::wait_for`] turns a
//! handle into a final outcome by polling the engine, so callers never need to
//! know whether the engine completes writes inline or through a task queue.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};

use crate::document::{Document, RecordId, DEFAULT_PRIMARY_KEY};
use crate::error::SyncError;
use crate::query::{SearchQuery, SearchResponse};
use crate::settings::IndexSettings;
use crate::task::{Task, TaskHandle, TaskStatus};
use crate::transport::{IdPage, IndexBackend, ScanCursor};

/// How long and how often [`IndexClient::wait`] polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Shared handle to one engine. Cheap to wrap in an `Arc`; safe for concurrent
/// use from any number of tasks.
pub struct IndexClient {
    backend: Arc<dyn IndexBackend>,
    wait: WaitConfig,
    primary_key: String,
}

impl IndexClient {
    pub fn new(backend: Arc<dyn IndexBackend>, wait: WaitConfig) -> Self {
        Self {
            backend,
            wait,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn backend(&self) -> &Arc<dyn IndexBackend> {
        &self.backend
    }

    pub fn wait_config(&self) -> WaitConfig {
        self.wait
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Create `index` unless it exists. Returns the creation handle, or `None`
    /// when there was nothing to do.
    pub async fn create_index_if_absent(
        &self,
        index: &str,
        primary_key: &str,
    ) -> Result<Option<TaskHandle>, SyncError> {
        if self.backend.get_index(index).await?.is_some() {
            tracing::debug!(index, "index already exists");
            return Ok(None);
        }
        tracing::info!(index, primary_key, "creating index");
        self.backend.create_index(index, primary_key).await.map(Some)
    }

    pub async fn apply_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<TaskHandle, SyncError> {
        tracing::debug!(index, "applying index settings");
        self.backend.update_settings(index, settings).await
    }

    pub async fn upsert_document(&self, index: &str, doc: &Document) -> Result<TaskHandle, SyncError> {
        self.upsert_documents(index, std::slice::from_ref(doc)).await
    }

    /// Batch upsert in a single engine call.
    pub async fn upsert_documents(
        &self,
        index: &str,
        docs: &[Document],
    ) -> Result<TaskHandle, SyncError> {
        let handle = self
            .backend
            .add_documents(index, &self.primary_key, docs)
            .await?;
        tracing::debug!(index, count = docs.len(), task = ?handle.uid, "documents submitted");
        Ok(handle)
    }

    pub async fn delete_document(&self, index: &str, id: RecordId) -> Result<TaskHandle, SyncError> {
        let handle = self.backend.delete_document(index, id).await?;
        tracing::debug!(index, id, task = ?handle.uid, "deletion submitted");
        Ok(handle)
    }

    /// Wait using the configured timeout and poll interval.
    pub async fn wait(&self, handle: &TaskHandle) -> Result<Task, SyncError> {
        self.wait_for(handle, self.wait.timeout, self.wait.poll_interval)
            .await
    }

    /// Poll until the task reaches a terminal status or `timeout` elapses.
    ///
    /// - succeeded → `Ok(task)`
    /// - failed → [`SyncError::TaskFailed`] with the engine's message
    /// - canceled → [`SyncError::TaskCanceled`] with the canceling task
    /// - deadline → [`SyncError::Timeout`]; the task may still complete later
    /// - anything else → [`SyncError::UnknownTaskState`]
    pub async fn wait_for(
        &self,
        handle: &TaskHandle,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Task, SyncError> {
        let Some(uid) = handle.uid else {
            return settle(Task::from_settled(handle));
        };

        let outcome = tokio::time::timeout(timeout, self.poll_until_terminal(uid, poll_interval)).await;
        match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    task = uid,
                    timeout_ms = timeout.as_millis() as u64,
                    "gave up waiting for task"
                );
                Err(SyncError::Timeout {
                    task_uid: uid,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn poll_until_terminal(&self, uid: u64, poll_interval: Duration) -> Result<Task, SyncError> {
        loop {
            let task = self.backend.get_task(uid).await?;
            match task.status {
                TaskStatus::Enqueued | TaskStatus::Processing => {
                    tracing::trace!(task = uid, status = %task.status, "task pending");
                    tokio::time::sleep(poll_interval).await;
                }
                _ => return settle(task),
            }
        }
    }

    /// Delete finished task records with any of `statuses` from the engine.
    pub async fn flush_tasks(&self, statuses: &[TaskStatus]) -> Result<TaskHandle, SyncError> {
        tracing::info!(
            statuses = %statuses.iter().map(TaskStatus::as_str).collect::<Vec<_>>().join(","),
            "flushing tasks"
        );
        self.backend.delete_tasks(statuses).await
    }

    /// Page through every id in `index`, `page_size` at a time.
    pub fn scan_ids<'a>(
        &'a self,
        index: &'a str,
        page_size: u64,
    ) -> BoxStream<'a, Result<IdPage, SyncError>> {
        stream::try_unfold(Some(ScanCursor::Start), move |cursor| async move {
            let Some(cursor) = cursor else {
                return Ok(None);
            };
            let page = self
                .backend
                .fetch_ids(index, &self.primary_key, &cursor, page_size)
                .await?;
            let next = page.next.clone();
            Ok(Some((page, next)))
        })
        .boxed()
    }

    pub async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResponse, SyncError> {
        self.backend.search(index, query).await
    }
}

fn settle(task: Task) -> Result<Task, SyncError> {
    match task.status {
        TaskStatus::Succeeded => Ok(task),
        TaskStatus::Failed => {
            let (code, message) = match task.error {
                Some(e) => (e.code, e.message),
                None => (String::new(), "no error message reported".into()),
            };
            Err(SyncError::TaskFailed {
                task_uid: task.uid,
                code,
                message,
            })
        }
        TaskStatus::Canceled => Err(SyncError::TaskCanceled {
            task_uid: task.uid,
            canceled_by: task.canceled_by,
        }),
        other => Err(SyncError::UnknownTaskState {
            task_uid: task.uid,
            status: other.to_string(),
        }),
    }
}
