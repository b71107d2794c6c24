//! In-memory engine and source of record.
//!
//! Useful for tests and dry runs. Nothing is persisted; writes land
//! immediately and the task outcome they report can be scripted.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use searchsync_core::config::BackendKind;
use searchsync_core::document::{Document, RecordId};
use searchsync_core::error::SyncError;
use searchsync_core::query::{Page, SearchQuery, SearchResponse};
use searchsync_core::settings::IndexSettings;
use searchsync_core::source::RecordSource;
use searchsync_core::task::{Task, TaskError, TaskHandle, TaskStatus};
use searchsync_core::transport::{IdPage, IndexBackend, IndexInfo, ScanCursor};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome the next submitted write will report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeed,
    /// Fails with this message; the write is not applied.
    Fail(String),
    /// Fails with an engine error code, e.g. `index_already_exists`.
    FailWith { code: String, message: String },
    /// Canceled by the given task; the write is not applied.
    Cancel(Option<u64>),
    /// Stays `processing` forever; the write is not applied.
    Stall,
}

#[derive(Debug, Default)]
struct MemIndex {
    primary_key: String,
    settings: Option<IndexSettings>,
    docs: BTreeMap<RecordId, Value>,
}

struct StoredTask {
    task: Task,
    /// Polls left before the final status shows.
    pending_polls: u32,
}

#[derive(Default)]
struct TaskLog {
    next_uid: u64,
    tasks: HashMap<u64, StoredTask>,
    script: VecDeque<TaskOutcome>,
}

/// Engine double implementing [`IndexBackend`].
///
/// In task mode (the default) every write gets a uid that [`get_task`]
/// resolves; with [`MemoryBackend::synchronous`] writes return settled handles
/// like an engine that commits inline.
///
/// [`get_task`]: IndexBackend::get_task
pub struct MemoryBackend {
    kind: BackendKind,
    synchronous: bool,
    pending_polls: u32,
    indexes: Mutex<HashMap<String, MemIndex>>,
    tasks: Mutex<TaskLog>,
    rejected: Mutex<HashSet<RecordId>>,
    mutations: Mutex<u64>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Task-based engine whose tasks settle on the first poll.
    pub fn new() -> Self {
        Self {
            kind: BackendKind::Meilisearch,
            synchronous: false,
            pending_polls: 0,
            indexes: Mutex::default(),
            tasks: Mutex::default(),
            rejected: Mutex::default(),
            mutations: Mutex::default(),
        }
    }

    /// Engine that applies writes inline and returns settled handles.
    pub fn synchronous() -> Self {
        Self {
            kind: BackendKind::Solr,
            synchronous: true,
            ..Self::new()
        }
    }

    /// Tasks report `processing` for `polls` polls before their final status.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Queue the outcome of the next write. Unscripted writes succeed.
    pub fn push_outcome(&self, outcome: TaskOutcome) {
        lock(&self.tasks).script.push_back(outcome);
    }

    /// Any write touching `id` fails at submission with a backend error.
    pub fn reject_writes_for(&self, id: RecordId) {
        lock(&self.rejected).insert(id);
    }

    /// Seed an index with documents, bypassing the task log.
    pub fn seed(&self, index: &str, docs: impl IntoIterator<Item = Document>) {
        let mut indexes = lock(&self.indexes);
        let idx = indexes.entry(index.to_string()).or_insert_with(|| MemIndex {
            primary_key: "id".into(),
            ..MemIndex::default()
        });
        for doc in docs {
            idx.docs.insert(doc.id(), doc.to_json(&idx.primary_key));
        }
    }

    /// Sorted ids currently stored in `index`.
    pub fn ids(&self, index: &str) -> Vec<RecordId> {
        lock(&self.indexes)
            .get(index)
            .map(|idx| idx.docs.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn document(&self, index: &str, id: RecordId) -> Option<Value> {
        lock(&self.indexes)
            .get(index)
            .and_then(|idx| idx.docs.get(&id).cloned())
    }

    pub fn settings(&self, index: &str) -> Option<IndexSettings> {
        lock(&self.indexes)
            .get(index)
            .and_then(|idx| idx.settings.clone())
    }

    /// Number of mutating calls received (writes, settings, index creation,
    /// task deletion).
    pub fn mutation_count(&self) -> u64 {
        *lock(&self.mutations)
    }

    fn check_rejected(&self, ids: impl IntoIterator<Item = RecordId>) -> Result<(), SyncError> {
        let rejected = lock(&self.rejected);
        match ids.into_iter().find(|id| rejected.contains(id)) {
            Some(id) => Err(SyncError::Backend(format!("write for document {id} rejected"))),
            None => Ok(()),
        }
    }

    /// Register a write, applying `apply` unless the scripted outcome says
    /// otherwise, and return its handle. In synchronous mode an unsuccessful
    /// outcome is reported inline as a backend error.
    fn submit(
        &self,
        index: &str,
        kind: &str,
        apply: impl FnOnce(&mut HashMap<String, MemIndex>),
    ) -> Result<TaskHandle, SyncError> {
        *lock(&self.mutations) += 1;

        let mut log = lock(&self.tasks);
        let outcome = log.script.pop_front().unwrap_or(TaskOutcome::Succeed);
        if outcome == TaskOutcome::Succeed {
            apply(&mut lock(&self.indexes));
        }
        if self.synchronous {
            return match outcome {
                TaskOutcome::Succeed => Ok(TaskHandle::settled(index, kind)),
                TaskOutcome::Fail(message) | TaskOutcome::FailWith { message, .. } => {
                    Err(SyncError::Backend(message))
                }
                other => Err(SyncError::Backend(format!("{kind} not applied: {other:?}"))),
            };
        }

        log.next_uid += 1;
        let uid = log.next_uid;
        let now = Utc::now();
        let (status, error, canceled_by) = match outcome {
            TaskOutcome::Succeed => (TaskStatus::Succeeded, None, None),
            TaskOutcome::Fail(message) => (
                TaskStatus::Failed,
                Some(TaskError {
                    message,
                    code: "internal".into(),
                    error_type: "internal".into(),
                    link: None,
                }),
                None,
            ),
            TaskOutcome::FailWith { code, message } => (
                TaskStatus::Failed,
                Some(TaskError {
                    message,
                    code,
                    error_type: "invalid_request".into(),
                    link: None,
                }),
                None,
            ),
            TaskOutcome::Cancel(by) => (TaskStatus::Canceled, None, by),
            TaskOutcome::Stall => (TaskStatus::Processing, None, None),
        };
        log.tasks.insert(
            uid,
            StoredTask {
                task: Task {
                    uid,
                    index_uid: Some(index.to_string()),
                    status,
                    kind: kind.to_string(),
                    error,
                    canceled_by,
                    enqueued_at: Some(now),
                    finished_at: None,
                },
                pending_polls: self.pending_polls,
            },
        );
        Ok(TaskHandle {
            uid: Some(uid),
            index_uid: Some(index.to_string()),
            status: TaskStatus::Enqueued,
            kind: kind.to_string(),
            enqueued_at: Some(now),
        })
    }
}

fn matches_filter(doc: &Value, field: &str, expected: &str) -> bool {
    let scalar_eq = |v: &Value| match v {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    };
    match doc.get(field) {
        Some(Value::Array(items)) => items.iter().any(scalar_eq),
        Some(v) => scalar_eq(v),
        None => false,
    }
}

#[async_trait]
impl IndexBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn url(&self) -> &str {
        "memory://"
    }

    async fn get_index(&self, index: &str) -> Result<Option<IndexInfo>, SyncError> {
        Ok(lock(&self.indexes).get(index).map(|idx| IndexInfo {
            uid: index.to_string(),
            primary_key: Some(idx.primary_key.clone()),
        }))
    }

    async fn create_index(&self, index: &str, primary_key: &str) -> Result<TaskHandle, SyncError> {
        self.submit(index, "indexCreation", |indexes| {
            indexes.entry(index.to_string()).or_insert_with(|| MemIndex {
                primary_key: primary_key.to_string(),
                ..MemIndex::default()
            });
        })
    }

    async fn update_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<TaskHandle, SyncError> {
        self.submit(index, "settingsUpdate", |indexes| {
            let idx = indexes.entry(index.to_string()).or_insert_with(|| MemIndex {
                primary_key: "id".into(),
                ..MemIndex::default()
            });
            idx.settings = Some(settings.clone());
        })
    }

    async fn add_documents(
        &self,
        index: &str,
        primary_key: &str,
        docs: &[Document],
    ) -> Result<TaskHandle, SyncError> {
        self.check_rejected(docs.iter().map(Document::id))?;
        self.submit(index, "documentAdditionOrUpdate", |indexes| {
            let idx = indexes.entry(index.to_string()).or_insert_with(|| MemIndex {
                primary_key: primary_key.to_string(),
                ..MemIndex::default()
            });
            for doc in docs {
                idx.docs.insert(doc.id(), doc.to_json(primary_key));
            }
        })
    }

    async fn delete_document(&self, index: &str, id: RecordId) -> Result<TaskHandle, SyncError> {
        self.check_rejected([id])?;
        self.submit(index, "documentDeletion", |indexes| {
            if let Some(idx) = indexes.get_mut(index) {
                idx.docs.remove(&id);
            }
        })
    }

    async fn get_task(&self, uid: u64) -> Result<Task, SyncError> {
        let mut log = lock(&self.tasks);
        let stored = log
            .tasks
            .get_mut(&uid)
            .ok_or_else(|| SyncError::Backend(format!("task {uid} not found")))?;
        if stored.pending_polls > 0 {
            stored.pending_polls -= 1;
            return Ok(Task {
                status: TaskStatus::Processing,
                ..stored.task.clone()
            });
        }
        Ok(stored.task.clone())
    }

    async fn delete_tasks(&self, statuses: &[TaskStatus]) -> Result<TaskHandle, SyncError> {
        let mut log = lock(&self.tasks);
        log.tasks.retain(|_, t| !statuses.contains(&t.task.status));
        *lock(&self.mutations) += 1;
        Ok(TaskHandle::settled("", "taskDeletion"))
    }

    async fn fetch_ids(
        &self,
        index: &str,
        _primary_key: &str,
        cursor: &ScanCursor,
        limit: u64,
    ) -> Result<IdPage, SyncError> {
        let offset = match cursor {
            ScanCursor::Start => 0,
            ScanCursor::Offset(o) => *o,
            ScanCursor::Token(t) => {
                return Err(SyncError::Backend(format!("unexpected scan token '{t}'")))
            }
        };
        let indexes = lock(&self.indexes);
        let Some(idx) = indexes.get(index) else {
            return Ok(IdPage {
                total: Some(0),
                ..IdPage::default()
            });
        };
        let total = idx.docs.len() as u64;
        let ids: Vec<RecordId> = idx
            .docs
            .keys()
            .skip(offset as usize)
            .take(limit as usize)
            .copied()
            .collect();
        let next = (!ids.is_empty() && offset + limit < total).then(|| ScanCursor::Offset(offset + limit));
        Ok(IdPage {
            ids,
            next,
            total: Some(total),
        })
    }

    /// Equality (AND) filters only; hits come back in id order.
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResponse, SyncError> {
        let (offset, limit) = match &query.page {
            Page::Offset { offset, limit } => (*offset, *limit),
            Page::Cursor { cursor, limit } => (cursor.parse().unwrap_or(0), *limit),
        };
        let indexes = lock(&self.indexes);
        let matching: Vec<&Value> = indexes
            .get(index)
            .map(|idx| {
                idx.docs
                    .values()
                    .filter(|doc| {
                        query
                            .spec
                            .and_filters
                            .iter()
                            .all(|(field, value)| matches_filter(doc, field, value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut resp = SearchResponse {
            total_hits: matching.len() as u64,
            offset,
            limit,
            hits: matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect(),
            ..SearchResponse::default()
        };
        if matches!(query.page, Page::Cursor { .. }) {
            resp.next_cursor = resp.next_offset().map(|o| o.to_string());
        }
        Ok(resp)
    }
}

/// Mutable in-memory system of record holding documents directly.
///
/// Pair it with [`StoredDocument`](searchsync_core::StoredDocument) as the
/// projector.
#[derive(Default)]
pub struct MemorySource {
    records: Mutex<BTreeMap<RecordId, Document>>,
    failing: Mutex<HashSet<RecordId>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let source = Self::new();
        for doc in docs {
            source.insert(doc);
        }
        source
    }

    pub fn insert(&self, doc: Document) {
        lock(&self.records).insert(doc.id(), doc);
    }

    pub fn remove(&self, id: RecordId) -> Option<Document> {
        lock(&self.records).remove(&id)
    }

    /// Loading `id` fails with a source error from now on.
    pub fn fail_on(&self, id: RecordId) {
        lock(&self.failing).insert(id);
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    type Record = Document;

    async fn get_by_id(&self, id: RecordId) -> Result<Option<Document>, SyncError> {
        if lock(&self.failing).contains(&id) {
            return Err(SyncError::Source(format!("record {id} unreadable")));
        }
        Ok(lock(&self.records).get(&id).cloned())
    }

    async fn exists(&self, id: RecordId) -> Result<bool, SyncError> {
        if lock(&self.failing).contains(&id) {
            return Err(SyncError::Source(format!("record {id} unreadable")));
        }
        Ok(lock(&self.records).contains_key(&id))
    }

    fn stream_ids(&self) -> BoxStream<'_, Result<RecordId, SyncError>> {
        let ids: Vec<RecordId> = lock(&self.records).keys().copied().collect();
        stream::iter(ids.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    fn doc(id: RecordId) -> Document {
        Document::from_json(json!({ "id": id, "name": format!("doc {id}") }), "id").unwrap()
    }

    #[tokio::test]
    async fn writes_apply_and_tasks_succeed() {
        let backend = MemoryBackend::new();
        let handle = backend.add_documents("idx", "id", &[doc(1), doc(2)]).await.unwrap();
        assert_eq!(handle.status, TaskStatus::Enqueued);
        let task = backend.get_task(handle.uid.unwrap()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(backend.ids("idx"), vec![1, 2]);
        assert_eq!(backend.mutation_count(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_is_not_applied() {
        let backend = MemoryBackend::new();
        backend.push_outcome(TaskOutcome::Fail("boom".into()));
        let handle = backend.add_documents("idx", "id", &[doc(1)]).await.unwrap();
        let task = backend.get_task(handle.uid.unwrap()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.unwrap().message, "boom");
        assert!(backend.ids("idx").is_empty());
    }

    #[tokio::test]
    async fn pending_polls_report_processing_first() {
        let backend = MemoryBackend::new().with_pending_polls(2);
        let uid = backend.delete_document("idx", 1).await.unwrap().uid.unwrap();
        assert_eq!(backend.get_task(uid).await.unwrap().status, TaskStatus::Processing);
        assert_eq!(backend.get_task(uid).await.unwrap().status, TaskStatus::Processing);
        assert_eq!(backend.get_task(uid).await.unwrap().status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn synchronous_mode_returns_settled_handles() {
        let backend = MemoryBackend::synchronous();
        let handle = backend.add_documents("idx", "id", &[doc(3)]).await.unwrap();
        assert!(handle.is_settled());
        assert_eq!(backend.kind(), BackendKind::Solr);
    }

    #[tokio::test]
    async fn synchronous_failure_is_reported_inline() {
        let backend = MemoryBackend::synchronous();
        backend.push_outcome(TaskOutcome::Fail("commit failed".into()));
        let err = backend.add_documents("idx", "id", &[doc(3)]).await.unwrap_err();
        assert!(matches!(err, SyncError::Backend(ref m) if m == "commit failed"));
        assert!(backend.ids("idx").is_empty());
    }

    #[tokio::test]
    async fn fetch_ids_pages_by_offset() {
        let backend = MemoryBackend::new();
        backend.seed("idx", (1..=5).map(doc));
        let first = backend.fetch_ids("idx", "id", &ScanCursor::Start, 2).await.unwrap();
        assert_eq!(first.ids, vec![1, 2]);
        assert_eq!(first.next, Some(ScanCursor::Offset(2)));
        let last = backend.fetch_ids("idx", "id", &ScanCursor::Offset(4), 2).await.unwrap();
        assert_eq!(last.ids, vec![5]);
        assert_eq!(last.next, None);
    }

    #[tokio::test]
    async fn rejected_ids_fail_at_submission() {
        let backend = MemoryBackend::new();
        backend.reject_writes_for(9);
        assert!(matches!(
            backend.delete_document("idx", 9).await,
            Err(SyncError::Backend(_))
        ));
        assert_eq!(backend.mutation_count(), 0);
    }

    #[tokio::test]
    async fn source_streams_sorted_ids() {
        let source = MemorySource::from_documents([doc(3), doc(1), doc(2)]);
        let ids: Vec<_> = source.stream_ids().try_collect().await.unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(source.exists(2).await.unwrap());
        source.remove(2);
        assert!(!source.exists(2).await.unwrap());

        source.fail_on(1);
        assert!(matches!(source.get_by_id(1).await, Err(SyncError::Source(_))));
    }
}
