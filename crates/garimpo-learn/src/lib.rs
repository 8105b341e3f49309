//! Garimpo Learning Layer
//!
//! Turns one verified extraction (a *gabarito*) into reusable per-label
//! knowledge: a [`ParserGenerator`] that authors anchored regex patterns,
//! and a [`ValidationGenerator`] that reverse-engineers conservative
//! per-field predicates. Both are deterministic and local; no model call
//! is involved in learning.
//!
//! # Examples
//!
//! ```
//! use garimpo_learn::ParserGenerator;
//! use garimpo_domain::FieldRecord;
//!
//! let text = "Nome: SON GOKU\nInscrição: 101943";
//! let mut gabarito = FieldRecord::new();
//! gabarito.set("inscricao", Some("101943".into()));
//!
//! let pack = ParserGenerator::default().generate(text, &gabarito);
//! assert!(pack.pattern("inscricao").is_some());
//! ```

#![warn(missing_docs)]

mod parser_gen;
mod validation_gen;

pub use parser_gen::ParserGenerator;
pub use validation_gen::ValidationGenerator;

/// Alternatives enumerated in a schema description, e.g.
/// `"Categoria (ADVOGADO, ADVOGADA, SUPLEMENTAR)"` yields the three
/// options. Returns an empty vec when the description enumerates nothing.
pub fn enum_alternatives(description: &str) -> Vec<String> {
    let Some(open) = description.rfind('(') else {
        return Vec::new();
    };
    let Some(close) = description[open..].find(')') else {
        return Vec::new();
    };

    let inner = &description[open + 1..open + close];
    if !inner.contains(',') {
        return Vec::new();
    }

    let items: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "..." && *s != "…")
        .map(str::to_string)
        .collect();

    if items.len() >= 2 {
        items
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_alternatives_parses_options() {
        let items = enum_alternatives("Categoria (ADVOGADO, ADVOGADA, SUPLEMENTAR, ...)");
        assert_eq!(items, vec!["ADVOGADO", "ADVOGADA", "SUPLEMENTAR"]);
    }

    #[test]
    fn test_enum_alternatives_ignores_plain_parentheses() {
        assert!(enum_alternatives("Número de inscrição (somente dígitos)").is_empty());
        assert!(enum_alternatives("Nome do profissional").is_empty());
    }
}
