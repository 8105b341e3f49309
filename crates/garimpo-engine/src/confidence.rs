//! Confidence scoring of a record against a validation pack.

use garimpo_domain::{FieldRecord, Schema, ValidationPack};

/// The score plus the fields that dragged it down.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceReport {
    /// Fraction of schema fields that passed, in `[0, 1]`
    pub score: f64,
    /// Schema fields that are null or failed their predicate
    pub failing: Vec<String>,
}

impl ConfidenceReport {
    /// Accept decision against a threshold (boundary inclusive)
    pub fn accepted(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

/// Score `record` against `pack` over the schema's field set.
///
/// A field passes when it is non-null and its predicate accepts the value;
/// a field with no predicate passes iff non-null. Null fields count as
/// failures: an absent value cannot be trusted any more than a wrong one.
pub fn score(record: &FieldRecord, pack: &ValidationPack, schema: &Schema) -> ConfidenceReport {
    if schema.is_empty() {
        return ConfidenceReport {
            score: 0.0,
            failing: Vec::new(),
        };
    }

    let mut passing = 0usize;
    let mut failing = Vec::new();

    for field in schema.fields() {
        let ok = match (record.value(field), pack.predicate(field)) {
            (Some(value), Some(predicate)) => predicate.accepts(value),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if ok {
            passing += 1;
        } else {
            failing.push(field.to_string());
        }
    }

    ConfidenceReport {
        score: passing as f64 / schema.len() as f64,
        failing,
    }
}
