//! searchsync-engine — the write side of SearchSync.
//!
//! - [`Indexer`]: one entity type bound to its source, projector and index
//! - [`Reconciler`]: drift audit and repair between source and index
//! - [`MemoryBackend`] / [`MemorySource`]: in-memory doubles for tests
//! - [`NdjsonSource`]: a source of record read from an NDJSON export

pub mod indexer;
pub mod memory;
pub mod ndjson;
pub mod reconciler;

pub use indexer::Indexer;
pub use memory::{MemoryBackend, MemorySource, TaskOutcome};
pub use ndjson::NdjsonSource;
pub use reconciler::{
    DriftKind, DriftRecord, ReconcileEvent, ReconcileOptions, ReconcilePhase, ReconcileReport,
    Reconciler, RepairFailure,
};
