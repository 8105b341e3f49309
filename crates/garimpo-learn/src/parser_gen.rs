//! Parser pack authorship from a verified extraction.

use garimpo_domain::{FieldRecord, ParserPack};
use regex::RegexBuilder;
use tracing::{debug, warn};

/// Authors one anchored regex per gabarito field.
///
/// For each non-null field the generator locates the value in the source
/// text, derives an anchor from the surrounding layout (the label text on
/// the same line, or the nearest preceding non-blank line), and emits
/// candidate patterns from tightest to loosest. Every candidate is
/// self-validated before emission: applied to the source text, its first
/// match's first capture must equal the gabarito value. Fields whose value
/// cannot be found, anchored, or captured are omitted from the pack; the
/// runtime routes those through the LLM instead.
pub struct ParserGenerator {
    /// How many occurrences of the value to try anchoring on
    max_occurrence_probes: usize,
    /// Compiled-size ceiling for candidate patterns
    size_limit: usize,
}

impl Default for ParserGenerator {
    fn default() -> Self {
        Self {
            max_occurrence_probes: 3,
            size_limit: 1 << 20,
        }
    }
}

/// An anchor needs at least this many non-space characters to be worth
/// trusting on sibling documents.
const MIN_ANCHOR_CHARS: usize = 3;

impl ParserGenerator {
    /// Generate a parser pack from `text` and a verified `gabarito`.
    ///
    /// The pack's field set is a subset of the gabarito's (and therefore
    /// of the schema the gabarito was extracted under).
    pub fn generate(&self, text: &str, gabarito: &FieldRecord) -> ParserPack {
        let mut pack = ParserPack::new();

        for (field, value) in gabarito.iter() {
            let Some(value) = value else { continue };
            if value.is_empty() {
                continue;
            }

            match self.author_pattern(text, value) {
                Some(pattern) => {
                    debug!(field, pattern, "pattern authored");
                    pack.insert(field, pattern);
                }
                None => {
                    warn!(field, "value not capturable, omitting from pack");
                }
            }
        }
        pack
    }

    fn author_pattern(&self, text: &str, value: &str) -> Option<String> {
        let standalone =
            |pos: &usize| -> bool { !embedded_in_word(text, *pos, value.len()) };
        for pos in occurrences(text, value)
            .filter(standalone)
            .take(self.max_occurrence_probes)
        {
            for candidate in candidates_at(text, pos, value) {
                if self.validates(&candidate, text, value) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// A candidate survives only if its first match's first capture over
    /// the source text reproduces the gabarito value exactly.
    fn validates(&self, pattern: &str, text: &str, value: &str) -> bool {
        let Ok(compiled) = RegexBuilder::new(pattern)
            .size_limit(self.size_limit)
            .build()
        else {
            return false;
        };
        compiled
            .captures(text)
            .and_then(|c| c.get(1))
            .is_some_and(|m| m.as_str() == value)
    }
}

/// Candidate patterns for the value occurrence at `pos`, tightest first.
fn candidates_at(text: &str, pos: usize, value: &str) -> Vec<String> {
    let line_start = text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = text[line_start..pos].trim();

    let loose = shape(value, false);
    let exact = shape(value, true);

    if non_space_chars(prefix) >= MIN_ANCHOR_CHARS {
        // Label and value share a line: "Inscrição: 101943"
        let anchor = regex::escape(prefix);
        let sep = r"[ \t:.\-]*";
        vec![
            format!("{anchor}{sep}({exact})"),
            format!("{anchor}{sep}({loose})"),
            format!(r"(?m){anchor}{sep}(\S[^\n]*?)[ \t]*$"),
        ]
    } else {
        // Value sits at the start of its line; anchor on the nearest
        // preceding non-blank line ("Inscrição\n101943").
        let Some(anchor_line) = text[..line_start]
            .lines()
            .rev()
            .find(|l| non_space_chars(l) >= MIN_ANCHOR_CHARS)
        else {
            return Vec::new();
        };
        let anchor = regex::escape(anchor_line.trim());
        vec![
            format!(r"{anchor}\s+({exact})"),
            format!(r"{anchor}\s+({loose})"),
            format!(r"(?m){anchor}[ \t]*\n[ \t]*(\S[^\n]*?)[ \t]*$"),
        ]
    }
}

fn non_space_chars(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

/// Generalize a value into a char-run pattern. `exact` pins run lengths
/// (`\d{6}`), otherwise runs are open (`\d+`). Punctuation stays literal,
/// which keeps structured tokens like dates and document numbers anchored
/// to their own shape.
fn shape(value: &str, exact: bool) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let n = i - start;
            if exact {
                out.push_str(&format!(r"\d{{{n}}}"));
            } else if n == 1 {
                out.push_str(r"\d");
            } else {
                out.push_str(r"\d+");
            }
        } else if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
            let n = i - start;
            if exact {
                out.push_str(&format!(r"\p{{L}}{{{n}}}"));
            } else {
                out.push_str(r"\p{L}+");
            }
        } else if c == ' ' {
            while i < chars.len() && chars[i] == ' ' {
                i += 1;
            }
            out.push_str(r"[ \t]+");
        } else {
            out.push_str(&regex::escape(&c.to_string()));
            i += 1;
        }
    }
    out
}

/// True when the occurrence at `pos` is glued to word characters on
/// either side. Anchoring on such an occurrence captures fragments of
/// longer words ("ADVOGADO" inside "ADVOGADOS") and must be skipped.
fn embedded_in_word(text: &str, pos: usize, len: usize) -> bool {
    let before = text[..pos].chars().next_back();
    let after = text[pos + len..].chars().next();
    before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric)
}

fn occurrences<'a>(text: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    let mut from = 0;
    std::iter::from_fn(move || {
        let found = text.get(from..)?.find(needle)?;
        let pos = from + found;
        from = pos + needle.len().max(1);
        Some(pos)
    })
}
