//! Field records: the per-document extraction result.

use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from field name to an extracted value, `None` meaning
/// "not found". Records are created per request and discarded after the
/// response; the only long-lived artifacts are the packs learned from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldRecord(BTreeMap<String, Option<String>>);

impl FieldRecord {
    /// Create an empty record (no fields at all)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with every schema field present and null
    pub fn nulls_for(schema: &Schema) -> Self {
        Self(schema.fields().map(|f| (f.to_string(), None)).collect())
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: Option<String>) {
        self.0.insert(field.into(), value);
    }

    /// The non-null value of `field`, if any
    pub fn value(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|v| v.as_deref())
    }

    /// True when `field` is absent or null
    pub fn is_null(&self, field: &str) -> bool {
        self.value(field).is_none()
    }

    /// Number of fields present in the record (null or not)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the record holds no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every field is null (or there are none)
    pub fn is_all_null(&self) -> bool {
        self.0.values().all(Option::is_none)
    }

    /// Count of non-null values
    pub fn non_null_count(&self) -> usize {
        self.0.values().filter(|v| v.is_some()).count()
    }

    /// Schema fields this record has no value for
    pub fn null_fields(&self, schema: &Schema) -> Vec<String> {
        schema
            .fields()
            .filter(|f| self.is_null(f))
            .map(str::to_string)
            .collect()
    }

    /// A copy restricted to the schema's key set, with missing fields null
    pub fn restricted_to(&self, schema: &Schema) -> Self {
        Self(
            schema
                .fields()
                .map(|f| (f.to_string(), self.value(f).map(str::to_string)))
                .collect(),
        )
    }

    /// Fill this record's null fields from `other`, leaving non-null
    /// values untouched
    pub fn fill_nulls_from(&mut self, other: &FieldRecord) {
        for (field, value) in &other.0 {
            if value.is_some() && self.is_null(field) {
                self.0.insert(field.clone(), value.clone());
            }
        }
    }

    /// Iterate over `(field, value)` pairs in stable order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl FromIterator<(String, Option<String>)> for FieldRecord {
    fn from_iter<T: IntoIterator<Item = (String, Option<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
