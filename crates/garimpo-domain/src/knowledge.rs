//! Versioned knowledge entries and the gabarito digest.

use crate::pack::{ParserPack, ValidationPack};
use crate::record::FieldRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One version of the learned knowledge for a label.
///
/// Entries are created by the background learner and never mutated; a
/// refinement publishes a strictly higher version that supersedes this one
/// atomically. `gabarito_digest` ties the entry back to the verified record
/// it was learned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// The document-class label this knowledge belongs to
    pub label: String,
    /// Version number, starting at 1
    pub version: u32,
    /// Learned per-field extraction patterns
    pub parser: ParserPack,
    /// Learned per-field validation predicates
    pub validation: ValidationPack,
    /// SHA-256 of the gabarito record this entry was generated from
    pub gabarito_digest: String,
    /// Creation time, unix seconds
    pub created_at: u64,
}

/// Lowercase hex SHA-256 over the canonical JSON form of a record.
///
/// Records serialize from a sorted map, so the digest is stable across
/// insertion orders.
pub fn gabarito_digest(record: &FieldRecord) -> String {
    let canonical =
        serde_json::to_string(record).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
