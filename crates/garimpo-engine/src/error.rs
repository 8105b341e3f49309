//! Engine error types.

use garimpo_domain::{SchemaError, TextSourceError};
use thiserror::Error;

/// Errors that surface to the batch as a per-item failure.
///
/// Everything else (provider hiccups, deadline expiry, malformed model
/// output, repository corruption) is recovered locally by the
/// orchestrator: the item degrades or falls back, it does not fail. Only
/// a request the engine cannot even begin (bad schema, unreadable
/// document) is reported, and the batch continues past it.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request schema failed structural validation
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// The document bytes could not be converted to text
    #[error("text source failure: {0}")]
    TextSource(#[from] TextSourceError),
}
