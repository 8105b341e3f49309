//! Label-agnostic heuristic extraction.
//!
//! A fixed catalogue of patterns for common structured tokens, plus two
//! schema-driven tricks: alternatives enumerated in a field description
//! are searched for literally, and untyped fields are resolved by
//! capturing the rest of the line after a keyword derived from the field
//! name and description. Cheap, synchronous, never fails; an
//! unrecognized field is simply null.

use garimpo_domain::{FieldRecord, Schema};
use garimpo_learn::enum_alternatives;
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Token families the catalogue knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Cpf,
    Cnpj,
    Cep,
    Date,
    Email,
    Phone,
    Currency,
    Number,
}

/// Keywords mapping a field name or description onto a token family.
const TYPE_KEYWORDS: &[(TokenKind, &[&str])] = &[
    (TokenKind::Cpf, &["cpf"]),
    (TokenKind::Cnpj, &["cnpj"]),
    (TokenKind::Cep, &["cep", "postal"]),
    (
        TokenKind::Date,
        &["data", "date", "nascimento", "emissao", "vencimento", "validade"],
    ),
    (TokenKind::Email, &["email", "e-mail"]),
    (TokenKind::Phone, &["telefone", "celular", "fone", "tel"]),
    (
        TokenKind::Currency,
        &["valor", "preco", "preço", "total", "subtotal"],
    ),
    (
        TokenKind::Number,
        &["numero", "número", "inscricao", "inscrição", "protocolo", "codigo", "código"],
    ),
];

/// Description words that carry no signal for keyword derivation.
const STOPWORDS: &[&str] = &[
    "de", "do", "da", "dos", "das", "o", "a", "os", "as", "um", "uma", "para", "com", "sem",
    "em", "no", "na", "e", "ou", "the", "of", "for", "and",
];

/// The fixed-catalogue extractor.
pub struct HeuristicExtractor {
    catalogue: Vec<(TokenKind, Regex)>,
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        let table: &[(TokenKind, &str)] = &[
            (TokenKind::Cpf, r"\b\d{3}\.?\d{3}\.?\d{3}-?\d{2}\b"),
            (TokenKind::Cnpj, r"\b\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2}\b"),
            (TokenKind::Cep, r"\b\d{5}-?\d{3}\b"),
            (TokenKind::Date, r"\b(\d{2})[/-](\d{2})[/-](\d{4})\b"),
            (
                TokenKind::Email,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            ),
            (TokenKind::Phone, r"\(?\d{2}\)?\s?\d{4,5}-?\d{4}"),
            (TokenKind::Currency, r"R\$\s*\d[\d.,]*"),
            (TokenKind::Number, r"\b\d{4,}\b"),
        ];
        let catalogue = table
            .iter()
            .map(|(kind, pattern)| {
                (*kind, Regex::new(pattern).expect("catalogue pattern"))
            })
            .collect();
        Self { catalogue }
    }
}

impl HeuristicExtractor {
    /// Extract whatever the catalogue recognizes; one pass per field.
    pub fn extract(&self, schema: &Schema, text: &str) -> FieldRecord {
        let mut record = FieldRecord::nulls_for(schema);

        for (field, description) in schema.iter() {
            let value = match detect_kind(field, description) {
                Some(kind) => self.catalogue_match(kind, text),
                None => find_enumerated(description, text)
                    .or_else(|| near_keyword(field, description, text)),
            };
            if value.is_some() {
                debug!(field, "heuristic hit");
            }
            record.set(field, value);
        }
        record
    }

    fn catalogue_match(&self, kind: TokenKind, text: &str) -> Option<String> {
        let regex = self
            .catalogue
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, re)| re)?;

        if kind == TokenKind::Date {
            // Only calendar-plausible dates are worth returning.
            return regex.captures_iter(text).find_map(|c| {
                let day: u32 = c.get(1)?.as_str().parse().ok()?;
                let month: u32 = c.get(2)?.as_str().parse().ok()?;
                if (1..=31).contains(&day) && (1..=12).contains(&month) {
                    Some(c.get(0)?.as_str().to_string())
                } else {
                    None
                }
            });
        }
        regex.find(text).map(|m| m.as_str().to_string())
    }
}

/// Fraction of schema fields the record has no value for.
pub fn failure_rate(record: &FieldRecord, schema: &Schema) -> f64 {
    if schema.is_empty() {
        return 1.0;
    }
    let nulls = schema.fields().filter(|f| record.is_null(f)).count();
    nulls as f64 / schema.len() as f64
}

fn detect_kind(field: &str, description: &str) -> Option<TokenKind> {
    let haystack = format!("{} {}", field.to_lowercase(), description.to_lowercase());
    TYPE_KEYWORDS.iter().find_map(|(kind, keywords)| {
        keywords
            .iter()
            .any(|kw| haystack.contains(kw))
            .then_some(*kind)
    })
}

/// Search the text for one of the alternatives a description enumerates.
fn find_enumerated(description: &str, text: &str) -> Option<String> {
    for alternative in enum_alternatives(description) {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(&alternative));
        let Ok(re) = RegexBuilder::new(&pattern).build() else {
            continue;
        };
        if let Some(m) = re.find(text) {
            return Some(m.as_str().to_string());
        }
    }
    None
}

/// Capture the rest of the line after a keyword derived from the field
/// name and its description.
fn near_keyword(field: &str, description: &str, text: &str) -> Option<String> {
    for keyword in derive_keywords(field, description) {
        let words: Vec<String> = keyword
            .split_whitespace()
            .map(regex::escape)
            .collect();
        if words.is_empty() {
            continue;
        }
        let pattern = format!(r"(?i){}\s*[:\-]?\s*([^\n]+)", words.join(r"[\s_]+"));
        let Ok(re) = RegexBuilder::new(&pattern).build() else {
            continue;
        };
        if let Some(value) = re.captures(text).and_then(|c| c.get(1)) {
            let cleaned = value
                .as_str()
                .trim()
                .trim_end_matches([',', ';', ':', '.', '!', '?'])
                .trim();
            if !cleaned.is_empty() {
                return Some(cleaned.to_string());
            }
        }
    }
    None
}

/// Keyword candidates, longest first: description head n-grams, then the
/// field name with separators opened up.
fn derive_keywords(field: &str, description: &str) -> Vec<String> {
    let cleaned: Vec<&str> = description
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect();

    let mut candidates = Vec::new();
    if cleaned.len() > 1 {
        candidates.push(cleaned[..cleaned.len().min(3)].join(" "));
        candidates.push(cleaned[..2].join(" "));
    }
    if let Some(first) = cleaned.first() {
        candidates.push(first.to_string());
    }
    candidates.push(field.replace('_', " "));
    candidates.push(field.to_string());

    let mut unique = Vec::new();
    for c in candidates {
        if c.chars().filter(|ch| !ch.is_whitespace()).count() >= 3 && !unique.contains(&c) {
            unique.push(c);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "ORDEM DOS ADVOGADOS DO BRASIL\n\
                        Nome: SON GOKU\n\
                        CPF: 123.456.789-09\n\
                        Inscrição: 101943\n\
                        Categoria: ADVOGADO\n\
                        Validade: 12/05/2024\n\
                        CEP 80010-000  Total R$ 1.234,56";

    fn extract(fields: &[(&str, &str)]) -> FieldRecord {
        let schema: Schema = fields.iter().copied().collect();
        HeuristicExtractor::default().extract(&schema, TEXT)
    }

    #[test]
    fn test_typed_tokens_found() {
        let record = extract(&[
            ("cpf", "CPF do profissional"),
            ("cep", "Código postal"),
            ("inscricao", "Número de inscrição"),
            ("valor_total", "Valor total"),
        ]);
        assert_eq!(record.value("cpf"), Some("123.456.789-09"));
        assert_eq!(record.value("cep"), Some("80010-000"));
        assert_eq!(record.value("inscricao"), Some("101943"));
        assert_eq!(record.value("valor_total"), Some("R$ 1.234,56"));
    }

    #[test]
    fn test_date_must_be_calendar_plausible() {
        let record = extract(&[("data_validade", "Data de validade")]);
        assert_eq!(record.value("data_validade"), Some("12/05/2024"));

        let schema: Schema = [("data_validade", "Data de validade")].into_iter().collect();
        let bogus = "Validade: 45/19/2024";
        let record = HeuristicExtractor::default().extract(&schema, bogus);
        assert!(record.is_null("data_validade"));
    }

    #[test]
    fn test_enumerated_description_searched_literally() {
        let record = extract(&[(
            "categoria",
            "Categoria do profissional (ADVOGADO, ADVOGADA, SUPLEMENTAR)",
        )]);
        assert_eq!(record.value("categoria"), Some("ADVOGADO"));
    }

    #[test]
    fn test_near_keyword_captures_rest_of_line() {
        let record = extract(&[("nome", "Nome do profissional")]);
        assert_eq!(record.value("nome"), Some("SON GOKU"));
    }

    #[test]
    fn test_unrecognized_field_is_null() {
        let record = extract(&[("xyzzy", "Campo que não existe")]);
        assert!(record.is_null("xyzzy"));
    }

    #[test]
    fn test_failure_rate() {
        let schema: Schema = [("a", "a"), ("b", "b"), ("c", "c"), ("d", "d")]
            .into_iter()
            .collect();
        let mut record = FieldRecord::nulls_for(&schema);
        record.set("a", Some("x".into()));
        assert_eq!(failure_rate(&record, &schema), 0.75);
        assert_eq!(failure_rate(&FieldRecord::new(), &Schema::new()), 1.0);
    }

    #[test]
    fn test_never_panics_on_hostile_text() {
        let schema: Schema = [("nome", "Nome"), ("cpf", "CPF")].into_iter().collect();
        let hostile = "((((\\\\\u{0}\u{ffff}]]]]\n\n\n....";
        let _ = HeuristicExtractor::default().extract(&schema, hostile);
    }
}
