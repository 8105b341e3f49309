//! Garimpo LLM Provider Layer
//!
//! Implementations of the [`LlmExtractor`] trait from `garimpo-domain`.
//!
//! # Providers
//!
//! - [`MockExtractor`]: deterministic, scriptable mock for testing
//! - [`OpenAiExtractor`]: OpenAI-compatible chat-completions integration
//!
//! Providers are single-shot: retry policy belongs to the caller, because
//! the synchronous path (one retry inside the watchdog deadline) and the
//! background jobs (bounded backoff) need different policies.
//!
//! # Examples
//!
//! ```
//! use garimpo_llm::MockExtractor;
//! use garimpo_domain::{FieldRecord, LlmExtractor, Schema};
//!
//! # async fn example() {
//! let mut canned = FieldRecord::new();
//! canned.set("nome", Some("SON GOKU".into()));
//!
//! let provider = MockExtractor::new(canned);
//! let schema: Schema = [("nome", "Nome do profissional")].into_iter().collect();
//! let record = provider.extract_all(&schema, "...").await.unwrap();
//! assert_eq!(record.value("nome"), Some("SON GOKU"));
//! # }
//! ```

#![warn(missing_docs)]

pub mod openai;
pub mod payload;
pub mod prompt;

use async_trait::async_trait;
use garimpo_domain::{FieldRecord, LlmExtractor, ProviderError, Schema};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use openai::OpenAiExtractor;

/// Scriptable mock provider for deterministic tests.
///
/// Responses can be queued per operation; when the queue is empty the
/// default record is returned. Calls are counted, an artificial latency
/// can be injected to exercise deadline handling, and errors can be queued
/// to exercise the retry paths.
///
/// Cloning shares the script and the counters.
#[derive(Debug, Clone)]
pub struct MockExtractor {
    default_response: FieldRecord,
    all_queue: Arc<Mutex<VecDeque<FieldRecord>>>,
    missing_queue: Arc<Mutex<VecDeque<FieldRecord>>>,
    error_queue: Arc<Mutex<VecDeque<ProviderError>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    all_calls: Arc<Mutex<usize>>,
    missing_calls: Arc<Mutex<usize>>,
}

impl MockExtractor {
    /// Create a mock that answers every call with `default_response`
    pub fn new(default_response: FieldRecord) -> Self {
        Self {
            default_response,
            all_queue: Arc::new(Mutex::new(VecDeque::new())),
            missing_queue: Arc::new(Mutex::new(VecDeque::new())),
            error_queue: Arc::new(Mutex::new(VecDeque::new())),
            delay: Arc::new(Mutex::new(None)),
            all_calls: Arc::new(Mutex::new(0)),
            missing_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Create a mock that answers with an all-null record
    pub fn empty() -> Self {
        Self::new(FieldRecord::new())
    }

    /// Queue a response for the next `extract_all` call
    pub fn push_all_response(&self, record: FieldRecord) {
        self.all_queue.lock().unwrap().push_back(record);
    }

    /// Queue a response for the next `extract_missing` call
    pub fn push_missing_response(&self, record: FieldRecord) {
        self.missing_queue.lock().unwrap().push_back(record);
    }

    /// Queue an error; the next call of either operation fails with it
    pub fn push_error(&self, error: ProviderError) {
        self.error_queue.lock().unwrap().push_back(error);
    }

    /// Inject an artificial latency before every response
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Number of `extract_all` calls observed
    pub fn extract_all_calls(&self) -> usize {
        *self.all_calls.lock().unwrap()
    }

    /// Number of `extract_missing` calls observed
    pub fn extract_missing_calls(&self) -> usize {
        *self.missing_calls.lock().unwrap()
    }

    /// Total calls across both operations
    pub fn total_calls(&self) -> usize {
        self.extract_all_calls() + self.extract_missing_calls()
    }

    async fn pre_call(&self) -> Result<(), ProviderError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.error_queue.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl LlmExtractor for MockExtractor {
    async fn extract_all(
        &self,
        schema: &Schema,
        _text: &str,
    ) -> Result<FieldRecord, ProviderError> {
        *self.all_calls.lock().unwrap() += 1;
        self.pre_call().await?;

        let record = self
            .all_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());
        Ok(record.restricted_to(schema))
    }

    async fn extract_missing(
        &self,
        schema: &Schema,
        _text: &str,
        partial: &FieldRecord,
    ) -> Result<FieldRecord, ProviderError> {
        *self.missing_calls.lock().unwrap() += 1;
        self.pre_call().await?;

        let record = self
            .missing_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());

        // Contract: only the partial's null fields come back.
        let mut out = FieldRecord::new();
        for field in partial.null_fields(schema) {
            out.set(&field, record.value(&field).map(str::to_string));
        }
        Ok(out)
    }
}
