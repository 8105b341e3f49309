//! Batch driver: loads a dataset descriptor, runs the engine item by
//! item, writes annotated JSON results and prints a summary.
//!
//! Descriptor format (either a bare list or `{"items": [...]}`):
//!
//! ```json
//! [
//!   {
//!     "label": "carteira_oab",
//!     "schema": { "nome": "Nome do profissional" },
//!     "pdf_path": "carteira_oab/exemplo1.txt"
//!   }
//! ]
//! ```

#![warn(missing_docs)]

use clap::Parser;
use colored::Colorize;
use garimpo_domain::{Schema, Utf8TextSource};
use garimpo_engine::{DocumentInput, EngineConfig, ItemOutcome, Orchestrator};
use garimpo_llm::OpenAiExtractor;
use garimpo_store::FsRepository;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// How long to let background learning land before the process exits
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "garimpo",
    about = "Structured field extraction from document batches",
    version
)]
pub struct Cli {
    /// JSON descriptor listing the documents to process
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the JSON results
    #[arg(short, long)]
    pub output: PathBuf,

    /// Base directory for the descriptor's document paths
    #[arg(short, long, default_value = ".")]
    pub base_path: PathBuf,

    /// Engine configuration file (TOML); defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// One descriptor entry
#[derive(Debug, Deserialize)]
pub struct ItemSpec {
    /// Document-class label
    pub label: String,
    /// Fields to extract
    pub schema: Schema,
    /// Document path, relative to the base path
    pub pdf_path: PathBuf,
}

/// Parse a descriptor into per-item results.
///
/// Items are parsed individually from their raw JSON so that one bad
/// entry (unknown shape, duplicate schema keys) fails that item alone and
/// the rest of the batch proceeds.
pub fn parse_descriptor(raw: &str) -> Result<Vec<Result<ItemSpec, String>>, String> {
    #[derive(Deserialize)]
    struct Wrapped {
        items: Vec<Box<RawValue>>,
    }

    // Either a bare list or {"items": [...]}. Raw items keep their
    // original JSON text, which is what lets duplicate schema keys be
    // detected per item instead of being collapsed by a shared parse.
    let items = match serde_json::from_str::<Vec<Box<RawValue>>>(raw) {
        Ok(items) => items,
        Err(_) => {
            serde_json::from_str::<Wrapped>(raw)
                .map_err(|e| format!("descriptor is not valid JSON: {e}"))?
                .items
        }
    };
    Ok(items
        .into_iter()
        .map(|raw_item| {
            serde_json::from_str::<ItemSpec>(raw_item.get())
                .map_err(|e| format!("invalid item: {e}"))
        })
        .collect())
}

/// One result row in the output file
#[derive(Debug, Serialize)]
pub struct AnnotatedOutcome {
    /// 1-based batch position
    pub item: usize,
    /// Label from the descriptor ("unknown" when the entry did not parse)
    pub label: String,
    /// Document path from the descriptor
    pub pdf_path: String,
    /// The engine's outcome with its annotations
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Aggregate batch statistics
#[derive(Debug, Default, Serialize)]
pub struct BatchStats {
    /// Items in the batch
    pub total: usize,
    /// Items that produced a record
    pub succeeded: usize,
    /// Items that failed outright
    pub failed: usize,
    /// Items answered from cached knowledge
    pub cache_hits: usize,
    /// Wall-clock seconds across all items
    pub total_elapsed_s: f64,
    /// Estimated model spend across all items
    pub total_estimated_cost: f64,
}

impl BatchStats {
    fn collect(outcomes: &[AnnotatedOutcome]) -> Self {
        let mut stats = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for row in outcomes {
            if row.outcome.succeeded() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            if row.outcome.cache_hit {
                stats.cache_hits += 1;
            }
            stats.total_elapsed_s += row.outcome.elapsed_s;
            stats.total_estimated_cost += row.outcome.estimated_cost;
        }
        stats
    }
}

#[derive(Serialize)]
struct Report {
    results: Vec<AnnotatedOutcome>,
    statistics: BatchStats,
}

/// Execute the batch. Returns the number of failed items.
pub async fn run(cli: Cli) -> Result<usize, String> {
    let config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
            EngineConfig::from_toml(&raw)?
        }
        None => EngineConfig::default(),
    };
    config.validate()?;

    let repo = FsRepository::open(&config.repository_root)
        .map_err(|e| format!("cannot open repository: {e}"))?;
    let llm = OpenAiExtractor::from_env().map_err(|e| e.to_string())?;
    let engine = Orchestrator::new(config, repo, llm);

    let raw = std::fs::read_to_string(&cli.input)
        .map_err(|e| format!("cannot read descriptor {}: {e}", cli.input.display()))?;
    let specs = parse_descriptor(&raw)?;
    println!("Loaded {} item(s) from {}", specs.len(), cli.input.display());

    // Resolve each entry to engine input, or to an immediate failure.
    let mut annotations: Vec<(String, String)> = Vec::with_capacity(specs.len());
    let mut prepared: Vec<Result<DocumentInput, String>> = Vec::with_capacity(specs.len());
    for spec in specs {
        match spec {
            Ok(spec) => {
                let path = cli.base_path.join(&spec.pdf_path);
                annotations.push((
                    spec.label.clone(),
                    spec.pdf_path.display().to_string(),
                ));
                prepared.push(read_document(&path).map(|bytes| DocumentInput {
                    label: spec.label,
                    schema: spec.schema,
                    bytes,
                }));
            }
            Err(reason) => {
                annotations.push(("unknown".into(), "unknown".into()));
                prepared.push(Err(reason));
            }
        }
    }

    let valid: Vec<DocumentInput> = prepared
        .iter()
        .filter_map(|p| p.as_ref().ok())
        .cloned()
        .collect();
    let mut engine_outcomes = engine.run_batch(&Utf8TextSource, valid).await.into_iter();

    let outcomes: Vec<AnnotatedOutcome> = prepared
        .into_iter()
        .zip(annotations)
        .enumerate()
        .map(|(idx, (prep, (label, pdf_path)))| {
            let outcome = match prep {
                Ok(_) => engine_outcomes
                    .next()
                    .unwrap_or_else(|| ItemOutcome::failure("missing engine outcome".into())),
                Err(reason) => ItemOutcome::failure(reason),
            };
            print_progress(idx + 1, &label, &outcome);
            AnnotatedOutcome {
                item: idx + 1,
                label,
                pdf_path,
                outcome,
            }
        })
        .collect();

    // Let learning land so accumulated knowledge is not lost, but never
    // hold the process hostage to a wedged provider.
    if tokio::time::timeout(SHUTDOWN_GRACE, engine.jobs().wait_idle())
        .await
        .is_err()
    {
        info!("background jobs still running after grace period, exiting anyway");
    }

    let stats = BatchStats::collect(&outcomes);
    print_summary(&stats);

    let report = Report {
        results: outcomes,
        statistics: stats,
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("cannot serialize results: {e}"))?;
    std::fs::write(&cli.output, json)
        .map_err(|e| format!("cannot write {}: {e}", cli.output.display()))?;
    println!("Results written to {}", cli.output.display());

    Ok(report.statistics.failed)
}

fn read_document(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("cannot read document {}: {e}", path.display()))
}

fn print_progress(item: usize, label: &str, outcome: &ItemOutcome) {
    if outcome.succeeded() {
        let path = outcome
            .path
            .map(|p| p.number().to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "[{item}] {} label={label} path={path} {:.3}s confidence={:.2}{}",
            "ok".green(),
            outcome.elapsed_s,
            outcome.confidence,
            if outcome.degraded { " (degraded)" } else { "" },
        );
    } else {
        println!(
            "[{item}] {} label={label} {}",
            "failed".red(),
            outcome.error.as_deref().unwrap_or("unknown error"),
        );
    }
}

fn print_summary(stats: &BatchStats) {
    println!("{}", "── batch summary ──".bold());
    println!("documents:      {}", stats.total);
    println!(
        "succeeded:      {} | failed: {}",
        stats.succeeded.to_string().green(),
        if stats.failed > 0 {
            stats.failed.to_string().red().to_string()
        } else {
            stats.failed.to_string()
        }
    );
    println!("cache hits:     {}", stats.cache_hits);
    println!("total elapsed:  {:.2}s", stats.total_elapsed_s);
    println!("estimated cost: ${:.6}", stats.total_estimated_cost);
}
