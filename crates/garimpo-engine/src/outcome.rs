//! Per-item batch results.

use garimpo_domain::FieldRecord;
use serde::{Serialize, Serializer};

/// Which branch of the decision tree handled an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    /// Cold document, heuristic was good enough; learning runs behind
    ColdHeuristic,
    /// Cached knowledge scored at or above the accept threshold
    CachedAccepted,
    /// Cached knowledge below threshold; model filled the failing fields
    CachedRefined,
    /// Cold document, heuristic insufficient; model extracted synchronously
    ColdLlm,
}

impl ExtractionPath {
    /// The path number used in batch annotations
    pub fn number(self) -> u8 {
        match self {
            ExtractionPath::ColdHeuristic => 1,
            ExtractionPath::CachedAccepted => 2,
            ExtractionPath::CachedRefined => 3,
            ExtractionPath::ColdLlm => 4,
        }
    }
}

impl Serialize for ExtractionPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

/// One batch item's result with its annotations.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    /// Extracted values, one per schema field (empty on failure)
    pub record: FieldRecord,
    /// Decision-tree path taken; absent when the item failed outright
    pub path: Option<ExtractionPath>,
    /// Wall-clock seconds spent on this item
    pub elapsed_s: f64,
    /// Whether knowledge for the label was found in the repository
    pub cache_hit: bool,
    /// Confidence score of the returned record
    pub confidence: f64,
    /// Estimated model cost for this item (0 on paths 1 and 2)
    pub estimated_cost: f64,
    /// True when a deadline or provider failure degraded the result to
    /// partial data
    pub degraded: bool,
    /// Fatal per-item error, when the request could not be processed
    pub error: Option<String>,
}

impl ItemOutcome {
    /// A per-item failure outcome (invalid schema, unreadable document)
    pub fn failure(message: String) -> Self {
        Self {
            record: FieldRecord::new(),
            path: None,
            elapsed_s: 0.0,
            cache_hit: false,
            confidence: 0.0,
            estimated_cost: 0.0,
            degraded: false,
            error: Some(message),
        }
    }

    /// True when the item was processed (possibly degraded), false when it
    /// failed outright
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_numbers() {
        assert_eq!(ExtractionPath::ColdHeuristic.number(), 1);
        assert_eq!(ExtractionPath::CachedAccepted.number(), 2);
        assert_eq!(ExtractionPath::CachedRefined.number(), 3);
        assert_eq!(ExtractionPath::ColdLlm.number(), 4);
    }

    #[test]
    fn test_path_serializes_as_number() {
        let json = serde_json::to_string(&ExtractionPath::CachedRefined).unwrap();
        assert_eq!(json, "3");
    }
}
