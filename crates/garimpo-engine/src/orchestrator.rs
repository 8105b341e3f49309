//! The four-path decision tree.
//!
//! Every request lands on exactly one path:
//!
//! | Path | Repository | Condition | Model call | Background |
//! |------|-----------|-----------|------------|------------|
//! | 2 | hit | score ≥ accept | none | none |
//! | 3 | hit | score < accept | `extract_missing`, deadline-bounded | refine → v+1 |
//! | 1 | miss | heuristic failure < threshold | none | generate v1 |
//! | 4 | miss | heuristic failure ≥ threshold | `extract_all`, deadline-bounded | learn v1 from the result |
//!
//! The synchronous answer never waits for background learning; the only
//! shared sink between them is the repository.

use crate::config::EngineConfig;
use crate::confidence;
use crate::error::EngineError;
use crate::executor::ParserRunner;
use crate::heuristic::{failure_rate, HeuristicExtractor};
use crate::jobs::{self, JobKind, JobRunner};
use crate::outcome::{ExtractionPath, ItemOutcome};
use crate::watchdog::BudgetWatchdog;
use garimpo_domain::{
    FieldRecord, KnowledgeEntry, LlmExtractor, ProviderError, Schema, TextSource, ValidationPack,
};
use garimpo_store::FsRepository;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// One batch item as handed to the engine.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    /// Document-class label, the knowledge key
    pub label: String,
    /// Fields to extract
    pub schema: Schema,
    /// Raw document bytes
    pub bytes: Vec<u8>,
}

/// Result of one deadline-bounded model dispatch.
struct Dispatch {
    record: FieldRecord,
    degraded: bool,
    dispatched: bool,
}

impl Dispatch {
    fn skipped() -> Self {
        Self {
            record: FieldRecord::new(),
            degraded: true,
            dispatched: false,
        }
    }

    fn degraded() -> Self {
        Self {
            record: FieldRecord::new(),
            degraded: true,
            dispatched: true,
        }
    }
}

/// The extraction engine's entry point.
///
/// Invoked sequentially per batch item; background learning jobs run on
/// the tokio pool concurrently with later items.
pub struct Orchestrator<L: LlmExtractor> {
    config: EngineConfig,
    repo: Arc<FsRepository>,
    llm: Arc<L>,
    heuristic: HeuristicExtractor,
    runner: ParserRunner,
    jobs: JobRunner,
}

impl<L: LlmExtractor + 'static> Orchestrator<L> {
    /// Assemble an engine over a repository and a model provider
    pub fn new(config: EngineConfig, repo: FsRepository, llm: L) -> Self {
        Self {
            config,
            repo: Arc::new(repo),
            llm: Arc::new(llm),
            heuristic: HeuristicExtractor::default(),
            runner: ParserRunner,
            jobs: JobRunner::new(),
        }
    }

    /// The background job runner (used to await quiescence at shutdown)
    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    /// The knowledge repository backing this engine
    pub fn repository(&self) -> &FsRepository {
        &self.repo
    }

    /// Process a batch sequentially, returning one outcome per item in
    /// order. Per-item failures (bad schema, unreadable document) are
    /// recorded and the batch continues.
    pub async fn run_batch(
        &self,
        text_source: &dyn TextSource,
        items: Vec<DocumentInput>,
    ) -> Vec<ItemOutcome> {
        let mut watchdog = BudgetWatchdog::new(items.len(), &self.config);
        let mut outcomes = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let started = Instant::now();
            let mut outcome = match self.prepare(&item, text_source) {
                Ok(text) => {
                    self.process(&item.label, &item.schema, &text, &watchdog)
                        .await
                }
                Err(e) => {
                    warn!(item = index + 1, label = %item.label, %e, "item failed");
                    ItemOutcome::failure(e.to_string())
                }
            };
            let elapsed = started.elapsed();
            outcome.elapsed_s = elapsed.as_secs_f64();
            watchdog.end_item(elapsed);

            info!(
                item = index + 1,
                label = %item.label,
                path = outcome.path.map(ExtractionPath::number),
                elapsed_s = outcome.elapsed_s,
                confidence = outcome.confidence,
                "item finished"
            );
            outcomes.push(outcome);
        }
        outcomes
    }

    fn prepare(
        &self,
        item: &DocumentInput,
        text_source: &dyn TextSource,
    ) -> Result<String, EngineError> {
        item.schema.validate()?;
        Ok(text_source.pdf_to_text(&item.bytes)?)
    }

    /// Route one prepared document through the decision tree.
    pub async fn process(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        watchdog: &BudgetWatchdog,
    ) -> ItemOutcome {
        let deadline = watchdog.begin_item();
        let started = Instant::now();

        let entry = match self.repo.get(label) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(label, %e, "repository read failed, treating as miss");
                None
            }
        };

        match entry {
            Some(entry) => {
                self.cached_paths(label, schema, text, entry, deadline, started)
                    .await
            }
            None => {
                self.cold_paths(label, schema, text, deadline, started)
                    .await
            }
        }
    }

    /// Paths 2 and 3: knowledge exists for the label.
    async fn cached_paths(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        entry: KnowledgeEntry,
        deadline: Duration,
        started: Instant,
    ) -> ItemOutcome {
        let parsed = self.runner.execute(&entry.parser, schema, text);
        let report = confidence::score(&parsed, &entry.validation, schema);

        if report.accepted(self.config.accept) {
            debug!(label, version = entry.version, score = report.score, "fast path");
            return ItemOutcome {
                record: parsed,
                path: Some(ExtractionPath::CachedAccepted),
                elapsed_s: 0.0,
                cache_hit: true,
                confidence: report.score,
                estimated_cost: 0.0,
                degraded: false,
                error: None,
            };
        }

        // Path 3: ask the model for the failing fields only. Fields the
        // parser produced that passed validation are preserved verbatim.
        debug!(
            label,
            score = report.score,
            failing = report.failing.len(),
            "cached knowledge below threshold, refining"
        );
        let mut partial = parsed;
        for field in &report.failing {
            partial.set(field.clone(), None);
        }

        let dispatch = self
            .call_with_deadline(deadline, started, || {
                self.llm.extract_missing(schema, text, &partial)
            })
            .await;

        let mut merged = partial;
        merged.fill_nulls_from(&dispatch.record);
        let final_report = confidence::score(&merged, &entry.validation, schema);

        // The merged record is the freshest gabarito we have; refine the
        // knowledge behind the response. A dispatch that brought nothing
        // back would regenerate the same pack, so it is skipped.
        if !dispatch.record.is_all_null() {
            self.jobs.enqueue(
                label,
                JobKind::Refine,
                jobs::learn_from_gabarito(
                    Arc::clone(&self.repo),
                    label.to_string(),
                    schema.clone(),
                    text.to_string(),
                    merged.clone(),
                    entry.version + 1,
                ),
            );
        }

        ItemOutcome {
            record: merged,
            path: Some(ExtractionPath::CachedRefined),
            elapsed_s: 0.0,
            cache_hit: true,
            confidence: final_report.score,
            estimated_cost: self.dispatch_cost(&dispatch),
            degraded: dispatch.degraded,
            error: None,
        }
    }

    /// Paths 1 and 4: nothing is known about the label yet.
    async fn cold_paths(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        deadline: Duration,
        started: Instant,
    ) -> ItemOutcome {
        let heuristic = self.heuristic.extract(schema, text);
        let rate = failure_rate(&heuristic, schema);

        if rate < self.config.heuristic_failure {
            // Path 1: good enough to answer now; learn properly behind.
            debug!(label, rate, "heuristic sufficient, learning in background");
            self.jobs.enqueue(
                label,
                JobKind::GenerateV1,
                jobs::generate_v1(
                    Arc::clone(&self.llm),
                    Arc::clone(&self.repo),
                    label.to_string(),
                    schema.clone(),
                    text.to_string(),
                ),
            );

            let report = confidence::score(&heuristic, &ValidationPack::new(), schema);
            return ItemOutcome {
                record: heuristic,
                path: Some(ExtractionPath::ColdHeuristic),
                elapsed_s: 0.0,
                cache_hit: false,
                confidence: report.score,
                estimated_cost: 0.0,
                degraded: false,
                error: None,
            };
        }

        // Path 4: the heuristic missed too much; pay for the model now.
        debug!(label, rate, "heuristic insufficient, extracting synchronously");
        let dispatch = self
            .call_with_deadline(deadline, started, || self.llm.extract_all(schema, text))
            .await;

        // Model values win; heuristic values persist only where the model
        // returned null.
        let mut merged = dispatch.record.restricted_to(schema);
        merged.fill_nulls_from(&heuristic);

        // An empty gabarito teaches nothing; only a real model result
        // seeds version 1.
        if !dispatch.record.is_all_null() {
            self.jobs.enqueue(
                label,
                JobKind::GenerateV1,
                jobs::learn_from_gabarito(
                    Arc::clone(&self.repo),
                    label.to_string(),
                    schema.clone(),
                    text.to_string(),
                    dispatch.record.restricted_to(schema),
                    1,
                ),
            );
        }

        let report = confidence::score(&merged, &ValidationPack::new(), schema);
        ItemOutcome {
            record: merged,
            path: Some(ExtractionPath::ColdLlm),
            elapsed_s: 0.0,
            cache_hit: false,
            confidence: report.score,
            estimated_cost: self.dispatch_cost(&dispatch),
            degraded: dispatch.degraded,
            error: None,
        }
    }

    /// Run one model call against what is left of the item deadline,
    /// retrying once on a transient failure if time allows. Expiry and
    /// unusable output degrade to an empty record, never an error.
    async fn call_with_deadline<F, Fut>(
        &self,
        deadline: Duration,
        started: Instant,
        mut call: F,
    ) -> Dispatch
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<FieldRecord, ProviderError>>,
    {
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            debug!("deadline already consumed, model call skipped");
            return Dispatch::skipped();
        }

        match timeout(remaining, call()).await {
            Ok(Ok(record)) => Dispatch {
                record,
                degraded: false,
                dispatched: true,
            },
            Ok(Err(e)) if e.is_retryable() => {
                warn!(%e, "model call failed, retrying within the deadline");
                let remaining = deadline.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Dispatch::degraded();
                }
                match timeout(remaining, call()).await {
                    Ok(Ok(record)) => Dispatch {
                        record,
                        degraded: false,
                        dispatched: true,
                    },
                    Ok(Err(e)) => {
                        warn!(%e, "retry failed, degrading to partial data");
                        Dispatch::degraded()
                    }
                    Err(_) => {
                        warn!("deadline expired during retry, degrading to partial data");
                        Dispatch::degraded()
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(%e, "model output unusable, degrading to partial data");
                Dispatch::degraded()
            }
            Err(_) => {
                warn!("deadline expired, model call cancelled");
                Dispatch::degraded()
            }
        }
    }

    fn dispatch_cost(&self, dispatch: &Dispatch) -> f64 {
        if dispatch.dispatched {
            self.config.llm_cost_estimate
        } else {
            0.0
        }
    }
}
