//! searchsync-http — HTTP transports for SearchSync.
//!
//! Two engines, one [`IndexBackend`] seam:
//! - [`MeiliBackend`]: task-queue engine; writes return a task uid to poll
//! - [`SolrBackend`]: synchronous-on-write engine; writes return settled handles
//!
//! # Example
//! ```rust,no_run
//! use searchsync_core::{EngineConfig, IndexClient};
//!
//! # fn demo() -> Result<(), searchsync_core::SyncError> {
//! let config = EngineConfig::new("http://localhost:7700");
//! let client = IndexClient::new(searchsync_http::connect(&config)?, config.wait_config());
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

mod common;
pub mod meili;
pub mod solr;

use std::sync::Arc;

use searchsync_core::config::{BackendKind, EngineConfig};
use searchsync_core::error::SyncError;
use searchsync_core::transport::IndexBackend;

pub use meili::MeiliBackend;
pub use solr::SolrBackend;

/// Build the transport selected by `config.backend`.
///
/// Fails fast with [`SyncError::NotConfigured`] if the URL is absent or invalid.
pub fn connect(config: &EngineConfig) -> Result<Arc<dyn IndexBackend>, SyncError> {
    let backend: Arc<dyn IndexBackend> = match config.backend {
        BackendKind::Meilisearch => Arc::new(MeiliBackend::new(config)?),
        BackendKind::Solr => Arc::new(SolrBackend::new(config)?),
    };
    tracing::info!(backend = %config.backend, url = backend.url(), "search backend configured");
    Ok(backend)
}
