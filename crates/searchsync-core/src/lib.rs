//! searchsync-core — foundation types and traits for keeping a search index in
//! step with a system of record.
//!
//! # Overview
//!
//! - [`IndexBackend`] — the async trait every engine transport implements
//! - [`IndexClient`] — uniform write surface plus task polling (`wait_for`)
//! - [`TaskHandle`] / [`TaskStatus`] — asynchronous engine operations
//! - [`QueryBuilder`] — one query assembler, rendered per engine dialect
//! - [`RecordSource`] / [`Projector`] — the system-of-record collaborators
//! - [`EngineConfig`] — explicit, validated configuration
//! - [`SyncError`] — structured error type

pub mod client;
pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod query;
pub mod settings;
pub mod source;
pub mod task;
pub mod transport;

pub use client::{IndexClient, WaitConfig};
pub use config::{BackendKind, EngineConfig, Profile};
pub use document::{Document, RecordId};
pub use entity::EntityKind;
pub use error::SyncError;
pub use query::{QueryBuilder, SearchQuery, SearchResponse};
pub use settings::IndexSettings;
pub use source::{Projector, RecordSource, StoredDocument};
pub use task::{Task, TaskHandle, TaskStatus};
pub use transport::{IdPage, IndexBackend, IndexInfo, ScanCursor};
