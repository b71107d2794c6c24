//! Collaborator traits for the system of record and the document projector.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::document::{Document, RecordId};
use crate::error::SyncError;

/// Read access to one record type in the system of record.
#[async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Send + Sync;

    /// `Ok(None)` when the record does not exist (or no longer exists).
    async fn get_by_id(&self, id: RecordId) -> Result<Option<Self::Record>, SyncError>;

    /// Cheaper existence probe; defaults to a full load.
    async fn exists(&self, id: RecordId) -> Result<bool, SyncError> {
        Ok(self.get_by_id(id).await?.is_some())
    }

    /// Every id of this record type, streamed so the collection never has to
    /// fit in memory.
    fn stream_ids(&self) -> BoxStream<'_, Result<RecordId, SyncError>>;
}

/// Turns a record into its search document. Field mapping lives entirely in
/// the implementation.
pub trait Projector<R>: Send + Sync {
    fn project(&self, record: &R) -> Result<Document, SyncError>;
}

/// Projector for sources that already store the computed document form.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredDocument;

impl Projector<Document> for StoredDocument {
    fn project(&self, record: &Document) -> Result<Document, SyncError> {
        Ok(record.clone())
    }
}
