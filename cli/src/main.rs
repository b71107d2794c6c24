//! SearchSync CLI — operate a search index kept in step with a system of record.
//!
//! # Commands
//! ```text
//! searchsync setup     --entity <E>
//! searchsync reconcile --entity <E> --source <export.ndjson> [--dry-run] [--only-deleted] [--only-missing] [--page-size N]
//! searchsync index     --entity <E> --source <export.ndjson> --id <N> [--sync]
//! searchsync delete    --entity <E> --id <N> [--sync]
//! searchsync reindex   --entity <E> --source <export.ndjson> [--batch-size N]
//! searchsync tasks     flush --status <S>... | get --uid <N>
//! searchsync search    --entity <E> [--q TEXT] [--filter field=value]... [--sort FIELD]
//! searchsync info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use searchsync_core::document::DEFAULT_PRIMARY_KEY;
use searchsync_core::query::FacetSort;
use searchsync_core::{
    BackendKind, EngineConfig, EntityKind, IndexClient, Profile, QueryBuilder, RecordId,
    StoredDocument, TaskStatus,
};
use searchsync_engine::{Indexer, NdjsonSource, ReconcileOptions};

mod cmd_reconcile;
mod logging;

#[derive(Parser)]
#[command(
    name = "searchsync",
    about = "Keep a Meilisearch or Solr index in step with its source of record",
    long_about = "
SearchSync CLI: set up indexes, push documents, reconcile drift and inspect tasks.
The source of record is an NDJSON export of projected documents (one object per
line, each with an `id`).

ENVIRONMENT VARIABLES:
  SEARCHSYNC_BACKEND           meilisearch | solr
  SEARCHSYNC_URL               Engine base URL
  SEARCHSYNC_API_KEY           Bearer token
  SEARCHSYNC_PROFILE           production | test
  SEARCHSYNC_WAIT_TIMEOUT_MS   Task wait timeout
  SEARCHSYNC_POLL_INTERVAL_MS  Task poll interval
",
    version
)]
struct Cli {
    /// YAML config file (overridden by environment, then by flags)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine base URL
    #[arg(long, global = true)]
    url: Option<String>,

    #[arg(long, global = true)]
    api_key: Option<String>,

    /// meilisearch | solr
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Use the test profile (prefixed index names, short waits)
    #[arg(long, global = true)]
    test_profile: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index if absent and apply its settings
    Setup {
        #[arg(long)]
        entity: EntityKind,
    },

    /// Find and repair drift between the source export and the index
    Reconcile {
        #[arg(long)]
        entity: EntityKind,
        /// NDJSON export of the source of record
        #[arg(long)]
        source: PathBuf,
        /// Report drift without repairing anything
        #[arg(long)]
        dry_run: bool,
        /// Only look for documents whose record was deleted
        #[arg(long, conflicts_with = "only_missing")]
        only_deleted: bool,
        /// Only look for records missing from the index
        #[arg(long)]
        only_missing: bool,
        /// Index documents fetched per page
        #[arg(long, default_value_t = searchsync_engine::reconciler::DEFAULT_PAGE_SIZE)]
        page_size: u64,
        /// Concurrent existence checks and repairs
        #[arg(long, default_value_t = searchsync_engine::reconciler::DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },

    /// Index one record from the source export
    Index {
        #[arg(long)]
        entity: EntityKind,
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        id: RecordId,
        /// Wait until the engine has applied the write
        #[arg(long)]
        sync: bool,
    },

    /// Remove one document from the index
    Delete {
        #[arg(long)]
        entity: EntityKind,
        #[arg(long)]
        id: RecordId,
        /// Wait until the engine has applied the removal
        #[arg(long)]
        sync: bool,
    },

    /// Upsert every record of the source export in batches
    Reindex {
        #[arg(long)]
        entity: EntityKind,
        #[arg(long)]
        source: PathBuf,
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
    },

    /// Engine task management
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },

    /// Run a query against an index
    Search {
        #[arg(long)]
        entity: EntityKind,
        /// Free text (empty = match everything)
        #[arg(long, default_value = "")]
        q: String,
        /// Equality filter, `field=value`; repeatable, AND-joined
        #[arg(long)]
        filter: Vec<String>,
        /// Equality filter, `field=value`; repeatable, OR-joined
        #[arg(long)]
        any: Vec<String>,
        /// Sort field; prefix with `-` for descending. Omit for relevance
        #[arg(long, default_value = "")]
        sort: String,
        /// Facet field; repeatable
        #[arg(long)]
        facet: Vec<String>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },

    /// Show the resolved configuration and index status
    Info,
}

#[derive(Subcommand)]
enum TasksAction {
    /// Delete finished task records by status
    Flush {
        #[arg(long, num_args = 1.., required = true)]
        status: Vec<TaskStatus>,
    },
    /// Show one task
    Get {
        #[arg(long)]
        uid: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&logging::LogConfig::from_flags(cli.verbose, cli.log_json));

    let config = resolve_config(&cli, |key| std::env::var(key).ok())?;
    tracing::debug!(
        backend = %config.backend,
        url = config.base_url(),
        profile = ?config.profile,
        "configuration resolved"
    );

    let backend = searchsync_http::connect(&config)?;
    let client = Arc::new(IndexClient::new(backend, config.wait_config()));
    dispatch(cli.command, &config, client).await
}

/// Config file, then `SEARCHSYNC_*` environment (looked up through `env`),
/// then flags.
fn resolve_config(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env_with(env)?;

    if let Some(url) = &cli.url {
        config.base_url = url.clone();
    }
    if let Some(key) = &cli.api_key {
        config.api_key = Some(key.clone());
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if cli.test_profile {
        config.profile = Profile::Test;
    }
    config.validate()?;
    Ok(config)
}

async fn dispatch(command: Commands, config: &EngineConfig, client: Arc<IndexClient>) -> Result<()> {
    match command {
        Commands::Setup { entity } => {
            let indexer = Indexer::new(entity, config, client, NdjsonSource::default(), StoredDocument);
            indexer.ensure_index().await?;
            println!("Index '{}' is ready", indexer.index_name());
            Ok(())
        }

        Commands::Reconcile {
            entity,
            source,
            dry_run,
            only_deleted,
            only_missing,
            page_size,
            concurrency,
        } => {
            let options = ReconcileOptions {
                dry_run,
                only_deleted,
                only_missing,
                page_size,
                existence_concurrency: concurrency,
            };
            cmd_reconcile::run(config, client, entity, &source, options).await
        }

        Commands::Index { entity, source, id, sync } => {
            let indexer = Indexer::new(entity, config, client, load_source(&source).await?, StoredDocument);
            if sync {
                let task = indexer.index_sync(id).await?;
                println!("{entity} {id} indexed (task {})", task.status);
            } else {
                let handle = indexer.index_async(id).await?;
                println!("{entity} {id} submitted: {}", serde_json::to_string(&handle)?);
            }
            Ok(())
        }

        Commands::Delete { entity, id, sync } => {
            let indexer = Indexer::new(entity, config, client, NdjsonSource::default(), StoredDocument);
            if sync {
                let task = indexer.delete_sync(id).await?;
                println!("{entity} {id} deleted (task {})", task.status);
            } else {
                let handle = indexer.delete_async(id).await?;
                println!("{entity} {id} deletion submitted: {}", serde_json::to_string(&handle)?);
            }
            Ok(())
        }

        Commands::Reindex { entity, source, batch_size } => {
            let indexer = Indexer::new(entity, config, client, load_source(&source).await?, StoredDocument);
            let handles = indexer.reindex_all(batch_size).await?;
            println!(
                "Submitted {} records to '{}' in {} batches",
                indexer.source().len(),
                indexer.index_name(),
                handles.len()
            );
            Ok(())
        }

        Commands::Tasks { action } => match action {
            TasksAction::Flush { status } => {
                let handle = client.flush_tasks(&status).await?;
                println!("Task deletion submitted: {}", serde_json::to_string(&handle)?);
                Ok(())
            }
            TasksAction::Get { uid } => {
                let task = client.backend().get_task(uid).await?;
                println!("{}", serde_json::to_string_pretty(&task)?);
                Ok(())
            }
        },

        Commands::Search {
            entity,
            q,
            filter,
            any,
            sort,
            facet,
            offset,
            limit,
        } => {
            let mut builder = QueryBuilder::new();
            builder
                .set_free_text(&q)
                .add_and_filters(parse_pairs(&filter)?)
                .add_or_filters(parse_pairs(&any)?)
                .set_ordering(&sort)
                .set_facets(facet, FacetSort::Count)
                .set_pagination(offset, limit);
            let index = config.index_name(entity);
            tracing::debug!(index = %index, sort = %sort, offset, limit, "searching");
            let resp = client.search(&index, &builder.build(true, None)).await?;

            for hit in &resp.hits {
                println!("{hit}");
            }
            for (field, counts) in &resp.facets {
                println!("facet {field}: {}", serde_json::to_string(counts)?);
            }
            eprintln!(
                "{} of {} hits (offset {}), more: {}",
                resp.hits.len(),
                resp.total_hits,
                resp.offset,
                resp.has_next_page()
            );
            Ok(())
        }

        Commands::Info => cmd_info(config, client).await,
    }
}

async fn load_source(path: &std::path::Path) -> Result<NdjsonSource> {
    NdjsonSource::open(path, DEFAULT_PRIMARY_KEY)
        .await
        .with_context(|| format!("loading source export '{}'", path.display()))
}

fn parse_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| anyhow!("filter '{pair}' is not field=value"))
        })
        .collect()
}

// ─── Info ────────────────────────────────────────────────────────────────────

async fn cmd_info(config: &EngineConfig, client: Arc<IndexClient>) -> Result<()> {
    println!("SearchSync v{}", env!("CARGO_PKG_VERSION"));
    println!("  Backend:        {}", config.backend);
    println!("  URL:            {}", config.base_url());
    println!("  Profile:        {:?}", config.profile);
    println!("  Wait timeout:   {:?}", config.wait_timeout());
    println!("  Poll interval:  {:?}", config.poll_interval());
    println!("  API key:        {}", if config.api_key.is_some() { "set" } else { "not set" });

    println!("Indexes:");
    for entity in EntityKind::ALL {
        let name = config.index_name(entity);
        let status = match client.backend().get_index(&name).await {
            Ok(Some(_)) => "present".to_string(),
            Ok(None) => "absent".to_string(),
            Err(e) => format!("unreachable ({e})"),
        };
        println!("  {:<14} {:<24} {status}", entity.plural(), name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchsync_core::query::SortClause;
    use std::collections::HashMap;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_environment() {
        let env: HashMap<&str, &str> = [
            ("SEARCHSYNC_URL", "http://env-host:7700"),
            ("SEARCHSYNC_BACKEND", "meilisearch"),
            ("SEARCHSYNC_API_KEY", "from-env"),
        ]
        .into_iter()
        .collect();
        let cli = Cli::parse_from([
            "searchsync",
            "--url",
            "http://search.internal:8983/solr",
            "--backend",
            "solr",
            "--test-profile",
            "info",
        ]);
        let config = resolve_config(&cli, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url(), "http://search.internal:8983/solr");
        assert_eq!(config.backend, BackendKind::Solr);
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.index_name(EntityKind::Agency), "test-agencies-v3");
    }

    #[test]
    fn environment_applies_without_flags() {
        let cli = Cli::parse_from(["searchsync", "info"]);
        let config = resolve_config(&cli, |k| {
            (k == "SEARCHSYNC_URL").then(|| "http://env-host:7700".to_string())
        })
        .unwrap();
        assert_eq!(config.base_url(), "http://env-host:7700");
    }

    #[test]
    fn search_defaults_to_relevance_descending() {
        let cli = Cli::parse_from(["searchsync", "search", "--entity", "reports"]);
        let Commands::Search { sort, .. } = cli.command else {
            panic!("expected search");
        };
        let mut builder = QueryBuilder::new();
        builder.set_ordering(&sort);
        assert_eq!(
            builder.spec().sort_clauses(),
            vec![SortClause::desc("score"), SortClause::asc("id")]
        );
    }

    #[test]
    fn reconcile_flags_parse() {
        let cli = Cli::parse_from([
            "searchsync",
            "reconcile",
            "--entity",
            "institutions",
            "--source",
            "export.ndjson",
            "--dry-run",
            "--only-missing",
            "--page-size",
            "200",
        ]);
        match cli.command {
            Commands::Reconcile {
                entity,
                dry_run,
                only_missing,
                only_deleted,
                page_size,
                ..
            } => {
                assert_eq!(entity, EntityKind::Institution);
                assert!(dry_run && only_missing && !only_deleted);
                assert_eq!(page_size, 200);
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn filter_pairs_need_equals() {
        assert_eq!(
            parse_pairs(&["country=DE".into()]).unwrap(),
            vec![("country".to_string(), "DE".to_string())]
        );
        assert!(parse_pairs(&["country".into()]).is_err());
    }
}
