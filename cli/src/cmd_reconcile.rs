//! `searchsync reconcile` — audit one index against an NDJSON export and
//! repair the drift.
//!
//! Prints one line per scanned index page and a final summary. Individual
//! repair failures are counted, listed and do not change the exit code.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use searchsync_core::document::DEFAULT_PRIMARY_KEY;
use searchsync_core::{EngineConfig, EntityKind, IndexClient, StoredDocument};
use searchsync_engine::{Indexer, NdjsonSource, ReconcileEvent, ReconcileOptions, Reconciler};

pub async fn run(
    config: &EngineConfig,
    client: Arc<IndexClient>,
    entity: EntityKind,
    source_path: &Path,
    options: ReconcileOptions,
) -> Result<()> {
    let source = NdjsonSource::open(source_path, DEFAULT_PRIMARY_KEY)
        .await
        .with_context(|| format!("loading source export '{}'", source_path.display()))?;
    let indexer = Indexer::new(entity, config, client, source, StoredDocument);

    println!(
        "Reconciling {} ({} records in source) against index '{}'{}",
        entity.plural(),
        indexer.source().len(),
        indexer.index_name(),
        if options.dry_run { " [dry run]" } else { "" }
    );

    let mut reconciler = Reconciler::new(&indexer, options).on_event(|event| match event {
        ReconcileEvent::PageScanned {
            page,
            ids,
            stale_so_far,
            total,
        } => {
            let total = total.map(|t| t.to_string()).unwrap_or_else(|| "?".into());
            println!("  page {page:>5}: {ids} ids (index total {total}), stale so far {stale_so_far}");
        }
        ReconcileEvent::SourceCompared { checked, missing } => {
            println!("  source: {checked} ids checked, {missing} missing from index");
        }
        _ => {}
    });
    let report = reconciler.run().await?;

    println!();
    println!("Stale in index:     {}", report.stale.len());
    println!("Missing from index: {}", report.missing.len());
    if report.dry_run {
        println!("Dry run: nothing was repaired.");
    } else {
        println!("Repaired:           {} deleted, {} indexed", report.repaired_stale, report.repaired_missing);
        println!("Failures:           {}", report.failures.len());
        for failure in &report.failures {
            println!("  {} {}: {}", failure.record.kind, failure.record.id, failure.error);
        }
    }
    Ok(())
}
