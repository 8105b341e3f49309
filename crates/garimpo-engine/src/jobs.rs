//! Fire-and-forget background learning jobs.

use garimpo_domain::{
    gabarito_digest, FieldRecord, KnowledgeEntry, LlmExtractor, Schema,
};
use garimpo_learn::{ParserGenerator, ValidationGenerator};
use garimpo_store::FsRepository;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Background job families. At most one job per `(label, kind)` pair is
/// ever in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Learn version-1 knowledge for a cold label
    GenerateV1,
    /// Regenerate knowledge from a corrected gabarito
    Refine,
}

/// Runs labelled background jobs on the tokio pool.
///
/// Jobs never touch the response of the request that spawned them; their
/// only effect is a later repository `put`. Enqueuing a job that is
/// already in flight for the same `(label, kind)` is a no-op; learning
/// twice from the same batch teaches nothing new.
#[derive(Clone, Default)]
pub struct JobRunner {
    in_flight: Arc<Mutex<HashSet<(String, JobKind)>>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl JobRunner {
    /// Create an idle runner
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job` unless one is already in flight for `(label, kind)`.
    /// Returns whether the job was actually spawned.
    pub fn enqueue<F>(&self, label: &str, kind: JobKind, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = (label.to_string(), kind);
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if in_flight.contains(&key) {
                debug!(label, ?kind, "job already in flight, dropping enqueue");
                return false;
            }
            in_flight.insert(key.clone());
        }

        let in_flight = Arc::clone(&self.in_flight);
        let handle = tokio::spawn(async move {
            job.await;
            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
        });

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        true
    }

    /// Number of jobs currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Wait for every spawned job to finish. Used at batch shutdown and by
    /// tests that need learning to have landed.
    pub async fn wait_idle(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = {
                let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
                handles.drain(..).collect()
            };
            if drained.is_empty() {
                break;
            }
            for handle in drained {
                let _ = handle.await;
            }
        }
    }
}

/// Transient-failure retry schedule for background model calls
const JOB_MAX_ATTEMPTS: u32 = 3;
const JOB_BACKOFF_BASE: Duration = Duration::from_millis(200);

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Learn and publish knowledge from a gabarito. Shared tail of both job
/// kinds; a pack that captures nothing is not worth publishing.
fn publish_knowledge(
    repo: &FsRepository,
    label: &str,
    schema: &Schema,
    text: &str,
    gabarito: &FieldRecord,
    version: u32,
) {
    let gabarito = gabarito.restricted_to(schema);
    let parser = ParserGenerator::default().generate(text, &gabarito);
    if parser.is_empty() {
        warn!(label, version, "no field was capturable, keeping repository unchanged");
        return;
    }
    let validation = ValidationGenerator.generate(schema, &gabarito);

    let entry = KnowledgeEntry {
        label: label.to_string(),
        version,
        parser,
        validation,
        gabarito_digest: gabarito_digest(&gabarito),
        created_at: now_unix(),
    };
    match repo.put(entry) {
        Ok(true) => info!(label, version, "knowledge version published"),
        Ok(false) => debug!(label, version, "a newer version beat this job, dropped"),
        // A failed write is dropped silently; knowledge regenerates on a
        // later request.
        Err(e) => warn!(label, version, %e, "knowledge write failed, dropped"),
    }
}

/// Body of the `generate_v1` job: extract a gabarito with the model (no
/// user-facing deadline), then learn and publish version 1.
pub async fn generate_v1<L: LlmExtractor + ?Sized>(
    llm: Arc<L>,
    repo: Arc<FsRepository>,
    label: String,
    schema: Schema,
    text: String,
) {
    let mut attempt = 0;
    let gabarito = loop {
        attempt += 1;
        match llm.extract_all(&schema, &text).await {
            Ok(record) => break record,
            Err(e) if e.is_retryable() && attempt < JOB_MAX_ATTEMPTS => {
                let backoff = JOB_BACKOFF_BASE * 2u32.pow(attempt - 1);
                warn!(%label, attempt, %e, "gabarito extraction failed, backing off");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                warn!(%label, attempt, %e, "gabarito extraction abandoned");
                return;
            }
        }
    };

    if gabarito.is_all_null() {
        warn!(%label, "model produced an empty gabarito, nothing to learn");
        return;
    }
    publish_knowledge(&repo, &label, &schema, &text, &gabarito, 1);
}

/// Learn from a gabarito the caller already holds and publish it at
/// `version`. No model call. This is the body of the `refine` job
/// (corrected gabarito, version N+1) and of `generate_v1` when the
/// synchronous path already paid for the model result (version 1).
pub async fn learn_from_gabarito(
    repo: Arc<FsRepository>,
    label: String,
    schema: Schema,
    text: String,
    gabarito: FieldRecord,
    version: u32,
) {
    publish_knowledge(&repo, &label, &schema, &text, &gabarito, version);
}
