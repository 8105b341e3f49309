//! Parser pack execution against document text.

use garimpo_domain::{FieldRecord, ParserPack, Schema};
use garimpo_store::PATTERN_SIZE_LIMIT;
use regex::RegexBuilder;
use tracing::warn;

/// Applies a learned parser pack to a document.
///
/// Local, fast and free: one regex scan per pack field. The first match's
/// first capture is the value; no match means null, as does a schema field
/// the pack does not cover. Packs are validated when published, so a
/// non-compiling pattern here means the repository was edited by hand;
/// it degrades to null rather than failing the request.
#[derive(Debug, Default)]
pub struct ParserRunner;

impl ParserRunner {
    /// Execute `pack` over `text`, producing a record for `schema`.
    pub fn execute(&self, pack: &ParserPack, schema: &Schema, text: &str) -> FieldRecord {
        let mut record = FieldRecord::nulls_for(schema);

        for field in schema.fields() {
            let Some(pattern) = pack.pattern(field) else {
                continue;
            };
            let compiled = match RegexBuilder::new(pattern)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()
            {
                Ok(re) => re,
                Err(e) => {
                    warn!(field, %e, "stored pattern no longer compiles, treating as null");
                    continue;
                }
            };

            let value = compiled
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty());
            record.set(field, value);
        }
        record
    }
}
