//! Parser and validation packs: the learned, versioned knowledge for a label.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered mapping from field name to a regex pattern.
///
/// Every pattern must contain at least one capture group; the first capture
/// of the first match is the extracted value. Pack generation guarantees
/// `fields ⊆ schema fields`, and the repository re-checks the capture-group
/// invariant before publishing a pack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParserPack(BTreeMap<String, String>);

impl ParserPack {
    /// Create an empty pack
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern for a field
    pub fn insert(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        self.0.insert(field.into(), pattern.into());
    }

    /// The pattern for `field`, if present
    pub fn pattern(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Number of fields covered by the pack
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the pack covers no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(field, pattern)` pairs in stable order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for ParserPack {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Coarse character-class alphabet used by [`Predicate::CharClass`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    /// ASCII digits only
    Digits,
    /// Alphabetic characters, internal spaces allowed (multi-word values)
    Letters,
    /// Alphanumeric characters, internal spaces allowed
    Alphanumeric,
}

impl CharClass {
    fn matches(self, value: &str) -> bool {
        let inner = |c: char| match self {
            CharClass::Digits => c.is_ascii_digit(),
            CharClass::Letters => c.is_alphabetic() || c == ' ',
            CharClass::Alphanumeric => c.is_alphanumeric() || c == ' ',
        };
        !value.is_empty() && value.chars().all(inner)
    }
}

/// A conservative per-field validation rule.
///
/// Predicates are persisted as a tagged structure (`kind` + parameters),
/// never as code. Evaluation is total: any string input yields `true` or
/// `false`, no predicate can error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Character count within `[min, max]`
    LengthRange {
        /// Minimum accepted length, inclusive
        min: usize,
        /// Maximum accepted length, inclusive
        max: usize,
    },
    /// All characters drawn from a class, with a length window
    CharClass {
        /// The accepted alphabet
        class: CharClass,
        /// Minimum accepted length, inclusive
        min_len: usize,
        /// Maximum accepted length, inclusive
        max_len: usize,
    },
    /// The value must equal one of the listed alternatives
    /// (case-insensitive)
    EnumeratedSet {
        /// Accepted alternatives, as they appeared in the description
        values: Vec<String>,
    },
    /// Positional mask: `#` matches a digit, `@` a letter, anything else
    /// matches itself. Length must match exactly.
    FormatTemplate {
        /// The mask the value must fit
        template: String,
    },
    /// The value must be non-empty after trimming
    NonEmpty,
}

impl Predicate {
    /// Evaluate the predicate against a candidate value.
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Predicate::LengthRange { min, max } => {
                let n = value.chars().count();
                n >= *min && n <= *max
            }
            Predicate::CharClass {
                class,
                min_len,
                max_len,
            } => {
                let n = value.chars().count();
                n >= *min_len && n <= *max_len && class.matches(value)
            }
            Predicate::EnumeratedSet { values } => {
                let lowered = value.to_lowercase();
                values.iter().any(|v| v.to_lowercase() == lowered)
            }
            Predicate::FormatTemplate { template } => {
                if template.chars().count() != value.chars().count() {
                    return false;
                }
                template.chars().zip(value.chars()).all(|(t, c)| match t {
                    '#' => c.is_ascii_digit(),
                    '@' => c.is_alphabetic(),
                    literal => c == literal,
                })
            }
            Predicate::NonEmpty => !value.trim().is_empty(),
        }
    }
}

/// Mapping from field name to its validation predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationPack(BTreeMap<String, Predicate>);

impl ValidationPack {
    /// Create an empty pack
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate for a field
    pub fn insert(&mut self, field: impl Into<String>, predicate: Predicate) {
        self.0.insert(field.into(), predicate);
    }

    /// The predicate for `field`, if present
    pub fn predicate(&self, field: &str) -> Option<&Predicate> {
        self.0.get(field)
    }

    /// Number of fields covered by the pack
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the pack covers no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(field, predicate)` pairs in stable order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Predicate)> for ValidationPack {
    fn from_iter<T: IntoIterator<Item = (String, Predicate)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
