//! NDJSON export of projected documents, used as a read-only source of record.
//!
//! One JSON object per line, each carrying its id under the primary key.
//! Blank lines are skipped.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use searchsync_core::document::{Document, RecordId};
use searchsync_core::error::SyncError;
use searchsync_core::source::RecordSource;

/// Documents loaded from an NDJSON file, keyed by id. Later lines win on
/// duplicate ids.
#[derive(Debug, Default, Clone)]
pub struct NdjsonSource {
    records: BTreeMap<RecordId, Document>,
}

impl NdjsonSource {
    pub async fn open(path: impl AsRef<Path>, primary_key: &str) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::Source(format!("cannot read {}: {e}", path.display())))?;
        let source = Self::parse(&text, primary_key)?;
        tracing::info!(path = %path.display(), records = source.len(), "loaded source export");
        Ok(source)
    }

    pub fn parse(text: &str, primary_key: &str) -> Result<Self, SyncError> {
        let mut records = BTreeMap::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value = serde_json::from_str(line)
                .map_err(|e| SyncError::Source(format!("line {}: {e}", n + 1)))?;
            let doc = Document::from_json(value, primary_key)
                .map_err(|e| SyncError::Source(format!("line {}: {e}", n + 1)))?;
            records.insert(doc.id(), doc);
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordSource for NdjsonSource {
    type Record = Document;

    async fn get_by_id(&self, id: RecordId) -> Result<Option<Document>, SyncError> {
        Ok(self.records.get(&id).cloned())
    }

    async fn exists(&self, id: RecordId) -> Result<bool, SyncError> {
        Ok(self.records.contains_key(&id))
    }

    fn stream_ids(&self) -> BoxStream<'_, Result<RecordId, SyncError>> {
        stream::iter(self.records.keys().copied().map(Ok)).boxed()
    }
}
