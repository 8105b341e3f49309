//! Extraction schema: the field set requested for one document class.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors produced by [`Schema::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The schema declares no fields at all
    #[error("schema declares no fields")]
    Empty,

    /// A field name is empty or not a valid identifier
    #[error("field name {0:?} is not an identifier")]
    BadFieldName(String),
}

/// Mapping from field name to a human-readable description.
///
/// Schemas are data, not types: the field set is only known at request
/// time, so the record produced for a schema is a string-keyed mapping
/// rather than a nominal struct. Keys are kept in a sorted map so that
/// serialized forms (and the digests derived from them) are stable.
///
/// Deserialization rejects duplicate field names; JSON would otherwise
/// collapse them silently, and a request that named a field twice is a
/// malformed request, not a shorter one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema(BTreeMap<String, String>);

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field name to description")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schema, A::Error> {
                let mut fields = BTreeMap::new();
                while let Some((name, description)) = access.next_entry::<String, String>()? {
                    if fields.insert(name.clone(), description).is_some() {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate field name {name:?}"
                        )));
                    }
                }
                Ok(Schema(fields))
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field with its description, replacing any previous entry
    pub fn insert(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.0.insert(name.into(), description.into());
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no fields are declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `field` is declared
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// The declared field names, in stable order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The description of `field`, if declared
    pub fn description(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Iterate over `(field, description)` pairs in stable order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check the structural rules every request must satisfy.
    ///
    /// A schema is valid when it is non-empty and every field name is a
    /// plain identifier (`[A-Za-z_][A-Za-z0-9_]*`). Duplicate names cannot
    /// be represented in the map itself; callers parsing raw JSON must
    /// reject duplicates at that boundary.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.0.is_empty() {
            return Err(SchemaError::Empty);
        }
        for name in self.0.keys() {
            if !is_identifier(name) {
                return Err(SchemaError::BadFieldName(name.clone()));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for Schema {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Schema {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
