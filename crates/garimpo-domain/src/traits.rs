//! Trait definitions for external collaborators.
//!
//! These traits define the boundaries between the engine and
//! infrastructure. Implementations live in other crates (`garimpo-llm`)
//! or with the embedding application.

use crate::record::FieldRecord;
use crate::schema::Schema;
use async_trait::async_trait;
use thiserror::Error;

/// Errors a language-model provider can surface to callers.
///
/// The engine's recovery policy depends on the variant: transient errors
/// are retried (once on the synchronous path, with backoff in background
/// jobs), malformed output degrades exactly like a deadline expiry, and
/// authentication errors abort the call without retry.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Retryable condition: rate limit, timeout at the provider, network
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider answered with a payload that cannot be parsed
    #[error("malformed provider output: {0}")]
    Malformed(String),

    /// Credential missing or rejected
    #[error("provider authentication failed: {0}")]
    Auth(String),
}

impl ProviderError {
    /// True for conditions worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Errors from the PDF-to-text conversion step
#[derive(Error, Debug, Clone)]
pub enum TextSourceError {
    /// The document bytes could not be converted to text
    #[error("unreadable document: {0}")]
    Unreadable(String),
}

/// The remote language-model extraction contract.
///
/// Both operations return records whose keys are a subset of the schema's.
/// Cancellation is external: callers race the returned future against a
/// deadline and treat expiry as an empty record, so implementations must
/// not hold locks across the call.
#[async_trait]
pub trait LlmExtractor: Send + Sync {
    /// Fill every schema field from the text, best effort; fields not
    /// present in the document come back null.
    async fn extract_all(&self, schema: &Schema, text: &str)
        -> Result<FieldRecord, ProviderError>;

    /// Fill only the fields that are null in `partial`. The non-null
    /// fields of `partial` are context, not targets; the returned record
    /// contains values for (a subset of) the null fields only.
    async fn extract_missing(
        &self,
        schema: &Schema,
        text: &str,
        partial: &FieldRecord,
    ) -> Result<FieldRecord, ProviderError>;
}

/// The PDF-to-text conversion seam.
///
/// Implementations must be deterministic for a given byte sequence;
/// whitespace normalization is acceptable.
pub trait TextSource: Send + Sync {
    /// Convert raw document bytes into extraction text
    fn pdf_to_text(&self, bytes: &[u8]) -> Result<String, TextSourceError>;
}
