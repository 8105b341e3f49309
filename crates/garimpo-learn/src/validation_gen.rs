//! Validation pack inference from a verified extraction.

use crate::enum_alternatives;
use garimpo_domain::{CharClass, FieldRecord, Predicate, Schema, ValidationPack};
use tracing::debug;

/// Infers one conservative predicate per non-null gabarito field.
///
/// The rules are deliberately tight: a predicate that accepts almost
/// anything lets a misfired pattern ("inscricao" capturing the literal
/// text "Seccional") score as a success, which is exactly the failure
/// mode this layer exists to catch. Preference order, most specific
/// first:
///
/// 1. the schema description enumerates alternatives and the value is one
///    of them → [`Predicate::EnumeratedSet`];
/// 2. the value carries digits or punctuation structure →
///    [`Predicate::FormatTemplate`] (exact positional mask);
/// 3. alphabetic free text → [`Predicate::CharClass`] with a length window
///    around the observed length (exact for short values);
/// 4. anything else → [`Predicate::LengthRange`] around the observed
///    length.
///
/// Null gabarito fields get no predicate: a single document proves
/// nothing about what a value for them should look like.
#[derive(Debug, Default)]
pub struct ValidationGenerator;

/// Values at or under this length get an exact-length window; a two-letter
/// state code should never stretch to four letters.
const EXACT_LENGTH_CUTOFF: usize = 3;

impl ValidationGenerator {
    /// Generate a validation pack for `gabarito` under `schema`.
    pub fn generate(&self, schema: &Schema, gabarito: &FieldRecord) -> ValidationPack {
        let mut pack = ValidationPack::new();

        for (field, value) in gabarito.iter() {
            let Some(value) = value else { continue };
            if value.is_empty() || !schema.contains(field) {
                continue;
            }
            let description = schema.description(field).unwrap_or("");
            let predicate = infer_predicate(description, value);
            debug!(field, ?predicate, "predicate inferred");
            pack.insert(field, predicate);
        }
        pack
    }
}

fn infer_predicate(description: &str, value: &str) -> Predicate {
    let alternatives = enum_alternatives(description);
    if !alternatives.is_empty()
        && alternatives
            .iter()
            .any(|a| a.to_lowercase() == value.to_lowercase())
    {
        return Predicate::EnumeratedSet {
            values: alternatives,
        };
    }

    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let has_structure = value
        .chars()
        .any(|c| !c.is_alphanumeric() && c != ' ');
    if has_digit || has_structure {
        return Predicate::FormatTemplate {
            template: mask(value),
        };
    }

    let n = value.chars().count();
    let (min, max) = if n <= EXACT_LENGTH_CUTOFF {
        (n, n)
    } else {
        ((n / 2).max(1), n * 2)
    };

    if value.chars().all(|c| c.is_alphabetic() || c == ' ') {
        Predicate::CharClass {
            class: CharClass::Letters,
            min_len: min,
            max_len: max,
        }
    } else {
        Predicate::LengthRange { min, max }
    }
}

/// Positional mask for a structured value: digits become `#`, letters `@`,
/// everything else stays literal.
fn mask(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                '#'
            } else if c.is_alphabetic() {
                '@'
            } else {
                c
            }
        })
        .collect()
}
