//! # Stored Values CLI (`sv`)
//!
//! Semantic search over the column values stored for each data source.
//!
//! ## Usage
//!
//! ```bash
//! sv --config ./config/sv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sv search <id> <terms>...` | Embed the terms and search a data source's values |
//! | `sv search-targets <id> <terms>... --dataset <file>` | Search every text column of a dataset |
//! | `sv columns <file>` | List the searchable columns of a dataset definition |
//! | `sv health <id>` | Check that a data source's values table exists |
//! | `sv serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Top 5 values like "customer email", at least 0.7 similar
//! sv search cc3ef3bc-44ec-4a43-8dc4-681cae5c996a customer email --limit 5 --threshold 0.7
//!
//! # Restrict to one column
//! sv search cc3ef3bc-44ec-4a43-8dc4-681cae5c996a acme --table users --column company
//!
//! # Search all text columns of a dataset, JSON output
//! sv search-targets cc3ef3bc-44ec-4a43-8dc4-681cae5c996a acme --dataset ./dataset.yaml --json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use stored_values::config::{self, Config};
use stored_values::dataset::extract_searchable_columns;
use stored_values::db;
use stored_values::embedding::{create_provider, generate_embedding};
use stored_values::fanout::{search_across_targets_with_report, FanOutReport};
use stored_values::health::health_check;
use stored_values::logging::init_logging;
use stored_values::models::{Ranking, SearchTarget, StoredValueResult};
use stored_values::query::ValueFilters;
use stored_values::search::{search_by_embedding, search_by_embedding_with_filters};
use stored_values::server;
use stored_values::store::postgres::PgValueStore;
use stored_values::validate::{parse_data_source_id, EmbeddingOptions, SearchOptions};

/// Stored Values CLI: semantic search over per-data-source column values.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sv.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sv",
    about = "Semantic search over stored column values",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed search terms and search a data source's stored values.
    ///
    /// When any of `--database`, `--schema`, `--table`, or `--column` is
    /// given, only values from matching columns are ranked.
    Search {
        /// Data source UUID (hyphenated form).
        data_source_id: String,

        /// Search terms; joined with spaces before embedding.
        #[arg(required = true)]
        terms: Vec<String>,

        /// Maximum number of results (default: `search.default_limit`).
        #[arg(long)]
        limit: Option<i64>,

        /// Minimum similarity in [0, 1]; switches ranking to similarity.
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        database: Option<String>,

        #[arg(long)]
        schema: Option<String>,

        #[arg(long)]
        table: Option<String>,

        #[arg(long)]
        column: Option<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search every searchable column of a dataset definition concurrently.
    ///
    /// Failed columns are reported and skipped; the remaining results are
    /// still printed.
    SearchTargets {
        data_source_id: String,

        #[arg(required = true)]
        terms: Vec<String>,

        /// Dataset definition file (YAML or JSON).
        #[arg(long)]
        dataset: PathBuf,

        /// Results per column (default: `search.default_limit_per_target`).
        #[arg(long)]
        limit_per_target: Option<i64>,

        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// List the searchable columns of a dataset definition.
    ///
    /// Columns whose type contains `text`, `char`, or `string` are listed.
    /// Does not need a database or a config file.
    Columns {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Check that a data source's values table exists.
    ///
    /// Prints `ok` or `missing`; exits with status 1 when missing.
    Health { data_source_id: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Columns { file, json } = &cli.command {
        init_logging("warn");
        return run_columns(file, *json);
    }

    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging.level);

    match cli.command {
        Commands::Search {
            data_source_id,
            terms,
            limit,
            threshold,
            database,
            schema,
            table,
            column,
            json,
        } => {
            let options = SearchOptions {
                limit: limit.unwrap_or(cfg.search.default_limit),
                similarity_threshold: threshold,
            };
            let filters = ValueFilters {
                database_name: database,
                schema_name: schema,
                table_name: table,
                column_name: column,
            };
            run_search(&cfg, &data_source_id, &terms, &options, &filters, json).await?;
        }
        Commands::SearchTargets {
            data_source_id,
            terms,
            dataset,
            limit_per_target,
            threshold,
            json,
        } => {
            let limit_per_target =
                limit_per_target.unwrap_or(cfg.search.default_limit_per_target);
            run_search_targets(
                &cfg,
                &data_source_id,
                &terms,
                &dataset,
                limit_per_target,
                threshold,
                json,
            )
            .await?;
        }
        Commands::Health { data_source_id } => {
            parse_data_source_id(&data_source_id)?;
            let pool = db::connect(&cfg).await?;
            let store = PgValueStore::new(pool.clone());
            let exists = health_check(&store, &data_source_id).await?;
            pool.close().await;
            if exists {
                println!("ok");
            } else {
                println!("missing");
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Columns { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

/// Embeds `terms`, cancelling the provider call on Ctrl-C.
async fn embed_terms(cfg: &Config, terms: &[String]) -> anyhow::Result<Vec<f32>> {
    let provider = create_provider(&cfg.embedding)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let options = EmbeddingOptions {
        max_retries: cfg.embedding.max_retries,
        cancel: Some(cancel),
        ..EmbeddingOptions::default()
    };
    let embedding = generate_embedding(provider.as_ref(), terms, &options).await;
    watcher.abort();

    Ok(embedding?)
}

async fn with_query_timeout<T, F>(secs: Option<u64>, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = stored_values::error::Result<T>>,
{
    match secs {
        Some(secs) => Ok(tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| anyhow::anyhow!("search timed out after {}s", secs))??),
        None => Ok(fut.await?),
    }
}

async fn run_search(
    cfg: &Config,
    data_source_id: &str,
    terms: &[String],
    options: &SearchOptions,
    filters: &ValueFilters,
    json: bool,
) -> anyhow::Result<()> {
    parse_data_source_id(data_source_id)?;
    options.validate()?;
    let embedding = embed_terms(cfg, terms).await?;

    let pool = db::connect(cfg).await?;
    let store = PgValueStore::new(pool.clone());
    let timeout = cfg.search.query_timeout_secs;

    let results = if filters.is_empty() {
        with_query_timeout(
            timeout,
            search_by_embedding(&store, data_source_id, &embedding, options),
        )
        .await
    } else {
        with_query_timeout(
            timeout,
            search_by_embedding_with_filters(&store, data_source_id, &embedding, options, filters),
        )
        .await
    };
    pool.close().await;
    let results = results?;

    if json {
        print_json(&results)?;
    } else {
        print_results(&results);
    }
    Ok(())
}

async fn run_search_targets(
    cfg: &Config,
    data_source_id: &str,
    terms: &[String],
    dataset: &Path,
    limit_per_target: i64,
    threshold: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    parse_data_source_id(data_source_id)?;
    let content = std::fs::read_to_string(dataset)
        .with_context(|| format!("Failed to read dataset file: {}", dataset.display()))?;
    let targets = extract_searchable_columns(&content)?;
    if targets.is_empty() {
        anyhow::bail!("No searchable columns in {}", dataset.display());
    }

    let embedding = embed_terms(cfg, terms).await?;

    let pool = db::connect(cfg).await?;
    let store = PgValueStore::new(pool.clone());
    let options = SearchOptions {
        limit: limit_per_target,
        similarity_threshold: threshold,
    };

    let report = with_query_timeout(
        cfg.search.query_timeout_secs,
        search_across_targets_with_report(
            &store,
            data_source_id,
            &embedding,
            &targets,
            limit_per_target,
            &options,
        ),
    )
    .await;
    pool.close().await;
    let report = report?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}

fn run_columns(file: &Path, json: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read dataset file: {}", file.display()))?;
    let targets = extract_searchable_columns(&content)?;

    if json {
        return print_json(&targets);
    }
    if targets.is_empty() {
        println!("No searchable columns.");
    }
    for target in &targets {
        println!("{}", target);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_results(results: &[StoredValueResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        let rank = match result.ranking {
            Ranking::Distance(d) => format!("distance {:.4}", d),
            Ranking::Similarity(s) => format!("similarity {:.4}", s),
        };
        println!("{}. [{}] {}", i + 1, rank, result.value.replace('\n', " ").trim());
        println!(
            "    column: {}",
            SearchTarget::new(
                result.database_name.as_str(),
                result.schema_name.as_str(),
                result.table_name.as_str(),
                result.column_name.as_str(),
            )
        );
        if let Some(synced_at) = result.synced_at {
            println!("    synced: {}", synced_at.format("%Y-%m-%d %H:%M:%S"));
        }
        println!("    id: {}", result.id);
        println!();
    }
}

fn print_report(report: &FanOutReport) {
    print_results(&report.results);
    for failure in &report.failures {
        eprintln!("warning: {} failed: {}", failure.target, failure.error);
    }
}
