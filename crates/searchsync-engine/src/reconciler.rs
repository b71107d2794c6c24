//! Drift reconciler — audits an index against its source of record and repairs
//! both sides.
//!
//! # Phase 1: SCANNING
//! Page through the index ids with the engine's native pagination, keeping
//! the id set. Unless `only_missing`, each page's ids are checked against the
//! source concurrently; ids the source no longer has are stale.
//!
//! # Phase 2: COMPARING
//! Unless `only_deleted`, stream every source id and test it against the
//! accumulated set; ids the index lacks are missing.
//!
//! # Phase 3: REPAIRING
//! Unless `dry_run`, delete stale ids and index missing ids through the
//! facade without waiting. Per-id failures are collected, never fatal.
//!
//! There is no snapshot between phases 1 and 2: a record written in between
//! can show up as drift and be repaired redundantly.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use searchsync_core::document::RecordId;
use searchsync_core::entity::EntityKind;
use searchsync_core::error::SyncError;
use searchsync_core::source::{Projector, RecordSource};

use crate::indexer::Indexer;

/// Default number of index documents fetched per page.
pub const DEFAULT_PAGE_SIZE: u64 = 5000;

/// Default number of concurrent source existence checks (and repairs).
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Where a reconciliation run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcilePhase {
    Idle,
    Scanning,
    Comparing,
    Repairing,
    Done,
}

impl std::fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Comparing => write!(f, "comparing"),
            Self::Repairing => write!(f, "repairing"),
            Self::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Report drift without calling any mutating operation.
    pub dry_run: bool,
    /// Only look for stale index entries (skip the source scan).
    pub only_deleted: bool,
    /// Only look for records missing from the index (skip existence checks).
    pub only_missing: bool,
    pub page_size: u64,
    pub existence_concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            only_deleted: false,
            only_missing: false,
            page_size: DEFAULT_PAGE_SIZE,
            existence_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// In the source, absent from the index.
    MissingFromIndex,
    /// In the index, absent from the source.
    StaleInIndex,
}

impl std::fmt::Display for DriftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFromIndex => write!(f, "missing_from_index"),
            Self::StaleInIndex => write!(f, "stale_in_index"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriftRecord {
    pub id: RecordId,
    pub kind: DriftKind,
}

/// A repair that could not be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairFailure {
    pub record: DriftRecord,
    pub error: String,
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub entity: EntityKind,
    pub index: String,
    pub dry_run: bool,
    /// Index pages scanned.
    pub pages: u64,
    /// Ids seen in the index.
    pub index_count: u64,
    /// Ids seen in the source (0 when the source scan was skipped).
    pub source_count: u64,
    pub stale: Vec<RecordId>,
    pub missing: Vec<RecordId>,
    pub repaired_stale: u64,
    pub repaired_missing: u64,
    pub failures: Vec<RepairFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReconcileReport {
    fn new(entity: EntityKind, index: &str, dry_run: bool) -> Self {
        Self {
            entity,
            index: index.to_string(),
            dry_run,
            pages: 0,
            index_count: 0,
            source_count: 0,
            stale: Vec::new(),
            missing: Vec::new(),
            repaired_stale: 0,
            repaired_missing: 0,
            failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Every drift record found, stale first.
    pub fn drift(&self) -> Vec<DriftRecord> {
        let stale = self.stale.iter().map(|&id| DriftRecord {
            id,
            kind: DriftKind::StaleInIndex,
        });
        let missing = self.missing.iter().map(|&id| DriftRecord {
            id,
            kind: DriftKind::MissingFromIndex,
        });
        stale.chain(missing).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.stale.is_empty() && self.missing.is_empty()
    }

    pub fn repaired(&self) -> u64 {
        self.repaired_stale + self.repaired_missing
    }
}

/// Progress notifications delivered to an observer during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    PhaseChanged(ReconcilePhase),
    PageScanned {
        page: u64,
        ids: usize,
        stale_so_far: usize,
        total: Option<u64>,
    },
    SourceCompared {
        checked: u64,
        missing: usize,
    },
    Repaired(DriftRecord),
    RepairFailed(RepairFailure),
}

type Observer<'a> = Box<dyn Fn(&ReconcileEvent) + Send + Sync + 'a>;

/// One reconciliation job over one indexer.
pub struct Reconciler<'a, S, P> {
    indexer: &'a Indexer<S, P>,
    options: ReconcileOptions,
    phase: ReconcilePhase,
    observer: Option<Observer<'a>>,
}

impl<'a, S, P> Reconciler<'a, S, P>
where
    S: RecordSource,
    P: Projector<S::Record>,
{
    pub fn new(indexer: &'a Indexer<S, P>, options: ReconcileOptions) -> Self {
        Self {
            indexer,
            options,
            phase: ReconcilePhase::Idle,
            observer: None,
        }
    }

    /// Receive [`ReconcileEvent`]s as the run progresses.
    pub fn on_event(mut self, f: impl Fn(&ReconcileEvent) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    fn emit(&self, event: ReconcileEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    fn enter(&mut self, phase: ReconcilePhase) {
        tracing::debug!(from = %self.phase, to = %phase, "reconcile phase");
        self.phase = phase;
        self.emit(ReconcileEvent::PhaseChanged(phase));
    }

    /// Run all phases. Fails only on errors reading either side; repair
    /// failures end up in the report.
    pub async fn run(&mut self) -> Result<ReconcileReport, SyncError> {
        let indexer = self.indexer;
        let opts = self.options.clone();
        let mut report = ReconcileReport::new(indexer.entity(), indexer.index_name(), opts.dry_run);

        if opts.only_deleted && opts.only_missing {
            tracing::warn!("only_deleted and only_missing both set; nothing to check");
        }
        tracing::info!(
            entity = %indexer.entity(),
            index = indexer.index_name(),
            dry_run = opts.dry_run,
            page_size = opts.page_size,
            "starting reconciliation"
        );

        self.enter(ReconcilePhase::Scanning);
        let index_ids = self.scan(&opts, &mut report).await?;

        self.enter(ReconcilePhase::Comparing);
        if !opts.only_deleted {
            self.compare(&index_ids, &mut report).await?;
        }
        drop(index_ids);

        self.enter(ReconcilePhase::Repairing);
        if opts.dry_run {
            tracing::info!(
                stale = report.stale.len(),
                missing = report.missing.len(),
                "dry run, no repairs"
            );
        } else {
            self.repair(&opts, &mut report).await;
        }

        report.finished_at = Some(Utc::now());
        self.enter(ReconcilePhase::Done);
        tracing::info!(
            index = indexer.index_name(),
            stale = report.stale.len(),
            missing = report.missing.len(),
            repaired = report.repaired(),
            failures = report.failures.len(),
            "reconciliation complete"
        );
        Ok(report)
    }

    async fn scan(
        &self,
        opts: &ReconcileOptions,
        report: &mut ReconcileReport,
    ) -> Result<HashSet<RecordId>, SyncError> {
        let indexer = self.indexer;
        let source = indexer.source();
        let concurrency = opts.existence_concurrency.max(1);
        let mut index_ids = HashSet::new();

        let mut pages = indexer
            .client()
            .scan_ids(indexer.index_name(), opts.page_size.max(1));
        while let Some(page) = pages.try_next().await? {
            report.pages += 1;
            report.index_count += page.ids.len() as u64;

            if !opts.only_missing {
                // A record deleted after the page was fetched counts as stale.
                let checked: Vec<(RecordId, bool)> = stream::iter(page.ids.iter().copied())
                    .map(|id| async move { source.exists(id).await.map(|found| (id, found)) })
                    .buffer_unordered(concurrency)
                    .try_collect()
                    .await?;
                let mut gone: Vec<RecordId> = checked
                    .into_iter()
                    .filter_map(|(id, found)| (!found).then_some(id))
                    .collect();
                gone.sort_unstable();
                report.stale.extend(gone);
            }
            if !opts.only_deleted {
                index_ids.extend(page.ids.iter().copied());
            }

            tracing::info!(
                page = report.pages,
                ids = page.ids.len(),
                scanned = report.index_count,
                total = ?page.total,
                stale = report.stale.len(),
                "index page scanned"
            );
            self.emit(ReconcileEvent::PageScanned {
                page: report.pages,
                ids: page.ids.len(),
                stale_so_far: report.stale.len(),
                total: page.total,
            });
        }
        Ok(index_ids)
    }

    async fn compare(
        &self,
        index_ids: &HashSet<RecordId>,
        report: &mut ReconcileReport,
    ) -> Result<(), SyncError> {
        let mut ids = self.indexer.source().stream_ids();
        while let Some(id) = ids.try_next().await? {
            report.source_count += 1;
            if !index_ids.contains(&id) {
                report.missing.push(id);
            }
        }
        tracing::info!(
            checked = report.source_count,
            missing = report.missing.len(),
            "source compared"
        );
        self.emit(ReconcileEvent::SourceCompared {
            checked: report.source_count,
            missing: report.missing.len(),
        });
        Ok(())
    }

    async fn repair(&self, opts: &ReconcileOptions, report: &mut ReconcileReport) {
        let indexer = self.indexer;
        let concurrency = opts.existence_concurrency.max(1);

        let stale = report.stale.iter().map(|&id| DriftRecord {
            id,
            kind: DriftKind::StaleInIndex,
        });
        let missing = report.missing.iter().map(|&id| DriftRecord {
            id,
            kind: DriftKind::MissingFromIndex,
        });
        let mut results = stream::iter(stale.chain(missing).collect::<Vec<_>>())
            .map(|record| async move {
                let outcome = match record.kind {
                    DriftKind::StaleInIndex => indexer.delete_async(record.id).await,
                    DriftKind::MissingFromIndex => indexer.index_async(record.id).await,
                };
                (record, outcome)
            })
            .buffer_unordered(concurrency);

        while let Some((record, outcome)) = results.next().await {
            match outcome {
                Ok(_) => {
                    match record.kind {
                        DriftKind::StaleInIndex => report.repaired_stale += 1,
                        DriftKind::MissingFromIndex => report.repaired_missing += 1,
                    }
                    self.emit(ReconcileEvent::Repaired(record));
                }
                Err(e) => {
                    tracing::warn!(id = record.id, kind = %record.kind, error = %e, "repair failed");
                    let failure = RepairFailure {
                        record,
                        error: e.to_string(),
                    };
                    self.emit(ReconcileEvent::RepairFailed(failure.clone()));
                    report.failures.push(failure);
                }
            }
        }
    }
}
