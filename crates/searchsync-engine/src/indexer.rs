//! Indexer facade — binds one entity type to its source, projector and index.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use searchsync_core::{EngineConfig, EntityKind, IndexClient, StoredDocument};
//! use searchsync_engine::{Indexer, MemoryBackend, MemorySource};
//!
//! # async fn demo() -> Result<(), searchsync_core::SyncError> {
//! let config = EngineConfig::new("http://localhost:7700");
//! let client = Arc::new(IndexClient::new(Arc::new(MemoryBackend::new()), config.wait_config()));
//! let indexer = Indexer::new(EntityKind::Report, &config, client, MemorySource::new(), StoredDocument);
//! indexer.ensure_index().await?;
//! indexer.delete_sync(42).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::TryStreamExt;

use searchsync_core::client::IndexClient;
use searchsync_core::config::EngineConfig;
use searchsync_core::document::{Document, RecordId};
use searchsync_core::entity::EntityKind;
use searchsync_core::error::SyncError;
use searchsync_core::settings::IndexSettings;
use searchsync_core::source::{Projector, RecordSource};
use searchsync_core::task::{Task, TaskHandle};

pub struct Indexer<S, P> {
    entity: EntityKind,
    index: String,
    settings: IndexSettings,
    client: Arc<IndexClient>,
    source: S,
    projector: P,
}

impl<S, P> Indexer<S, P>
where
    S: RecordSource,
    P: Projector<S::Record>,
{
    /// The index name comes from `config` (per-entity override, test prefix).
    pub fn new(
        entity: EntityKind,
        config: &EngineConfig,
        client: Arc<IndexClient>,
        source: S,
        projector: P,
    ) -> Self {
        Self {
            entity,
            index: config.index_name(entity),
            settings: IndexSettings::for_entity(entity),
            client,
            source,
            projector,
        }
    }

    /// Replace the entity's default settings.
    pub fn with_settings(mut self, settings: IndexSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    pub fn client(&self) -> &Arc<IndexClient> {
        &self.client
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn load(&self, id: RecordId) -> Result<Document, SyncError> {
        let record = self
            .source
            .get_by_id(id)
            .await?
            .ok_or(SyncError::RecordNotFound {
                entity: self.entity,
                id,
            })?;
        let doc = self.projector.project(&record)?;
        if doc.id() != id {
            return Err(SyncError::Projection(format!(
                "{} {id} projected to document {}",
                self.entity,
                doc.id()
            )));
        }
        Ok(doc)
    }

    /// Load, project and upsert without waiting.
    pub async fn index_async(&self, id: RecordId) -> Result<TaskHandle, SyncError> {
        let doc = self.load(id).await?;
        self.client.upsert_document(&self.index, &doc).await
    }

    /// Like [`index_async`](Self::index_async), then block until the engine
    /// has applied the write.
    pub async fn index_sync(&self, id: RecordId) -> Result<Task, SyncError> {
        let handle = self.index_async(id).await?;
        self.client.wait(&handle).await
    }

    pub async fn delete_async(&self, id: RecordId) -> Result<TaskHandle, SyncError> {
        self.client.delete_document(&self.index, id).await
    }

    pub async fn delete_sync(&self, id: RecordId) -> Result<Task, SyncError> {
        let handle = self.delete_async(id).await?;
        self.client.wait(&handle).await
    }

    /// Create the index if needed and apply the entity settings, waiting on
    /// both. Safe to run on every deploy.
    pub async fn ensure_index(&self) -> Result<(), SyncError> {
        if let Some(handle) = self
            .client
            .create_index_if_absent(&self.index, self.client.primary_key())
            .await?
        {
            match self.client.wait(&handle).await {
                Ok(_) => {}
                Err(e) if e.is_index_already_exists() => {
                    tracing::debug!(index = %self.index, "index created concurrently");
                }
                Err(e) => return Err(e),
            }
        }
        let handle = self.client.apply_settings(&self.index, &self.settings).await?;
        self.client.wait(&handle).await?;
        tracing::info!(entity = %self.entity, index = %self.index, "index ready");
        Ok(())
    }

    /// Upsert every record of the source in batches of `batch_size`. Records
    /// that vanish mid-run are skipped. Returns one handle per batch.
    pub async fn reindex_all(&self, batch_size: usize) -> Result<Vec<TaskHandle>, SyncError> {
        let batch_size = batch_size.max(1);
        let mut handles = Vec::new();
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        let mut ids = self.source.stream_ids();
        while let Some(id) = ids.try_next().await? {
            match self.load(id).await {
                Ok(doc) => batch.push(doc),
                Err(SyncError::RecordNotFound { .. }) => {
                    tracing::debug!(entity = %self.entity, id, "record vanished, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            }
            if batch.len() == batch_size {
                total += batch.len();
                handles.push(self.client.upsert_documents(&self.index, &batch).await?);
                batch.clear();
                tracing::info!(index = %self.index, total, "reindex batch submitted");
            }
        }
        if !batch.is_empty() {
            total += batch.len();
            handles.push(self.client.upsert_documents(&self.index, &batch).await?);
        }
        tracing::info!(index = %self.index, total, batches = handles.len(), "reindex submitted");
        Ok(handles)
    }
}
