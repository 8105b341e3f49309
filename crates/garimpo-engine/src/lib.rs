//! Garimpo Extraction Engine
//!
//! The runtime core: routes each document through a four-path decision
//! tree that trades model cost against cached knowledge, learns a
//! reusable per-label extractor in the background, and amortizes a time
//! budget across the batch.
//!
//! # Architecture
//!
//! ```text
//! bytes → TextSource → Orchestrator ─┬─ ParserRunner + confidence (cached paths)
//!                                    ├─ HeuristicExtractor        (cold paths)
//!                                    ├─ LlmExtractor ⏱ watchdog   (paths 3 & 4)
//!                                    └─ JobRunner → learn → FsRepository
//! ```
//!
//! Repeated documents of a class converge onto Path 2: a cached parser
//! pack, sub-100ms latency, zero model cost.
//!
//! # Example
//!
//! ```no_run
//! use garimpo_engine::{DocumentInput, EngineConfig, Orchestrator};
//! use garimpo_domain::{Schema, Utf8TextSource};
//! use garimpo_llm::OpenAiExtractor;
//! use garimpo_store::FsRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let repo = FsRepository::open(&config.repository_root)?;
//! let llm = OpenAiExtractor::from_env()?;
//! let engine = Orchestrator::new(config, repo, llm);
//!
//! let schema: Schema = [("nome", "Nome do profissional")].into_iter().collect();
//! let items = vec![DocumentInput {
//!     label: "carteira_oab".into(),
//!     schema,
//!     bytes: std::fs::read("carteira.txt")?,
//! }];
//!
//! let outcomes = engine.run_batch(&Utf8TextSource, items).await;
//! engine.jobs().wait_idle().await; // let learning land before exit
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod confidence;
mod config;
mod error;
mod executor;
mod heuristic;
pub mod jobs;
mod orchestrator;
mod outcome;
mod watchdog;

pub use config::EngineConfig;
pub use error::EngineError;
pub use executor::ParserRunner;
pub use heuristic::{failure_rate, HeuristicExtractor};
pub use jobs::{JobKind, JobRunner};
pub use orchestrator::{DocumentInput, Orchestrator};
pub use outcome::{ExtractionPath, ItemOutcome};
pub use watchdog::BudgetWatchdog;
