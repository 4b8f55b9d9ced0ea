//! coborrow: mines co-borrowing rules from a library's borrow log.
//!
//! Reads completed borrows from the data directory, clusters patrons, mines
//! association rules per cluster and writes the results back next to the
//! log. Also answers recommendation and summary queries against the last
//! exported rule set.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use coborrow_core::config::AppConfig;
use coborrow_core::types::EntityId;
use coborrow_pipeline::{ExportStatus, Pipeline, RunReport};
use coborrow_recommend::{RuleRecommender, RuleSetSummary};
use coborrow_store::{EventSource, JsonFileStore, ResultReader};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "coborrow")]
#[command(about = "Segmented association-rule mining over library borrow history")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long, global = true, env = "COBORROW__STORE__DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cluster patrons, mine every cluster and export the results
    Run(RunArgs),
    /// Mine again with the stored cluster assignment
    Mine(MineArgs),
    /// Recommend items for one patron from the stored rule set
    Recommend {
        #[arg(long)]
        entity: EntityId,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Summarize the stored rule set
    Summary,
}

#[derive(clap::Args, Debug)]
struct MiningArgs {
    #[arg(long, env = "COBORROW__PIPELINE__MIN_SUPPORT")]
    min_support: Option<f64>,

    #[arg(long, env = "COBORROW__PIPELINE__MIN_CONFIDENCE")]
    min_confidence: Option<f64>,

    /// Mine clusters on the rayon pool
    #[arg(long, default_value_t = false)]
    parallel: bool,
}

impl MiningArgs {
    fn apply(&self, config: &mut AppConfig) {
        let pipeline = &mut config.pipeline;
        if let Some(min_support) = self.min_support {
            pipeline.min_support = min_support;
        }
        if let Some(min_confidence) = self.min_confidence {
            pipeline.min_confidence = min_confidence;
        }
        if self.parallel {
            pipeline.parallel = true;
        }
    }
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Number of clusters (overrides config)
    #[arg(long, env = "COBORROW__PIPELINE__CLUSTERS")]
    clusters: Option<usize>,

    #[arg(long, env = "COBORROW__PIPELINE__SEED")]
    seed: Option<u64>,

    /// Mine the whole basket once instead of per cluster
    #[arg(long, default_value_t = false)]
    unsegmented: bool,

    #[command(flatten)]
    mining: MiningArgs,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        self.mining.apply(config);
        let pipeline = &mut config.pipeline;
        if let Some(clusters) = self.clusters {
            pipeline.clusters = clusters;
        }
        if let Some(seed) = self.seed {
            pipeline.seed = seed;
        }
        if self.unsegmented {
            pipeline.segmented = false;
        }
    }
}

/// Mining reuses the stored clusters, so only the mining knobs apply.
#[derive(clap::Args, Debug)]
struct MineArgs {
    #[command(flatten)]
    mining: MiningArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coborrow=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(Some(path))
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }

    let store = JsonFileStore::new(&config.store.data_dir);

    match cli.command {
        Command::Run(args) => {
            args.apply(&mut config);
            log_config(&config);
            let report = Pipeline::new(config.pipeline).run(&store, &store)?;
            finish_run(report)
        }
        Command::Mine(args) => {
            args.mining.apply(&mut config);
            log_config(&config);
            let report = Pipeline::new(config.pipeline).run_from_assignments(&store, &store)?;
            finish_run(report)
        }
        Command::Recommend { entity, limit } => {
            let document = store
                .load_rules()?
                .context("no rule set has been exported yet")?;
            let cluster_id = store
                .load_assignments()?
                .and_then(|assignment| assignment.cluster_of(entity));

            let history = store.fetch_history(entity)?;
            let recommendations =
                RuleRecommender::from_document(&document)?.recommend(&history, cluster_id, limit);
            info!(
                entity,
                cluster_id = ?cluster_id,
                history = history.len(),
                recommendations = recommendations.len(),
                "Recommendations ready"
            );
            print_json(&recommendations)
        }
        Command::Summary => {
            let document = store
                .load_rules()?
                .context("no rule set has been exported yet")?;
            let events = store.fetch_events()?;
            print_json(&RuleSetSummary::from_document(&document, &events)?)
        }
    }
}

fn log_config(config: &AppConfig) {
    let pipeline = &config.pipeline;
    info!(
        data_dir = %config.store.data_dir.display(),
        clusters = pipeline.clusters,
        min_support = pipeline.min_support,
        min_confidence = pipeline.min_confidence,
        seed = pipeline.seed,
        segmented = pipeline.segmented,
        parallel = pipeline.parallel,
        "Configuration loaded"
    );
}

/// Print the report, then fail the process if the export did not land.
fn finish_run(report: RunReport) -> anyhow::Result<()> {
    print_json(&report)?;
    if let ExportStatus::Failed { reason } = &report.export {
        bail!("results were computed but not exported: {reason}");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
