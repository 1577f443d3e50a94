//! kmap - reconcile extracted entities from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kmap_core::{Entity, ExtractionBatch, ReconcileConfig, Relationship};
use kmap_graph::{
    Canonicalizer, ConflictDetector, CrossDocumentAnalysis, InMemorySimilaritySearch,
    MergeStatistics, SimilaritySearch,
};

#[derive(Parser)]
#[command(name = "kmap")]
#[command(about = "Entity canonicalization and cross-document conflict detection")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Canonicalize a batch and detect cross-document conflicts
    Reconcile {
        /// Extraction batch (JSON with `entities` and `relationships`)
        #[arg(short, long)]
        input: PathBuf,

        /// Previously canonicalized entities (JSON array) to match against
        #[arg(long)]
        index: Option<PathBuf>,

        /// Config file (.toml, .json, .yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Config file (.toml, .json, .yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Output of `kmap reconcile`.
#[derive(Debug, Serialize)]
struct ReconcileReport {
    canonical_entities: Vec<Entity>,
    merge_statistics: MergeStatistics,
    comparisons: Vec<Relationship>,
    analysis: CrossDocumentAnalysis,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("kmap_graph=info".parse()?),
        )
        .init();

    match cli.command {
        Commands::Reconcile {
            input,
            index,
            config,
            pretty,
        } => {
            let config = load_config(config.as_deref())?;
            let batch: ExtractionBatch = read_json(&input)?;
            let prior: Vec<Entity> = match &index {
                Some(path) => read_json(path)?,
                None => Vec::new(),
            };

            let report = reconcile(&config, batch, prior).await?;
            let output = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", output);
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Explicit file, else `~/.kmap/config.toml` if present, else environment.
fn load_config(path: Option<&Path>) -> anyhow::Result<ReconcileConfig> {
    let config = match path {
        Some(path) => ReconcileConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let default_path = ReconcileConfig::default_path();
            if default_path.exists() {
                ReconcileConfig::from_file(&default_path).with_context(|| {
                    format!("failed to load config from {}", default_path.display())
                })?
            } else {
                let config = ReconcileConfig::from_env();
                config.validate()?;
                config
            }
        }
    };
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

async fn reconcile(
    config: &ReconcileConfig,
    batch: ExtractionBatch,
    prior: Vec<Entity>,
) -> anyhow::Result<ReconcileReport> {
    let search: Option<Arc<dyn SimilaritySearch>> = if prior.is_empty() {
        None
    } else {
        info!("Seeding similarity index with {} prior entities", prior.len());
        Some(Arc::new(InMemorySimilaritySearch::with_entities(prior)))
    };

    info!(
        "Reconciling {} entities and {} relationships",
        batch.entities.len(),
        batch.relationships.len()
    );

    let canonicalizer = Canonicalizer::new(config.canonicalization.clone(), search)?;
    let canonical = canonicalizer.canonicalize(batch.entities.clone()).await;
    let merge_statistics = canonicalizer.merge_statistics(&batch.entities, &canonical);

    let detector = ConflictDetector::new(config.conflict.clone())?;
    let (comparisons, analysis) = detector.detect_and_create_comparisons(&canonical);

    Ok(ReconcileReport {
        canonical_entities: canonical,
        merge_statistics,
        comparisons,
        analysis,
    })
}
