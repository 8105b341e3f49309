//! End-to-end decision-tree scenarios over a real on-disk repository and
//! a scripted model provider.

use garimpo_domain::{
    FieldRecord, KnowledgeEntry, ParserPack, Predicate, Schema, Utf8TextSource, ValidationPack,
};
use garimpo_engine::{DocumentInput, EngineConfig, ExtractionPath, Orchestrator};
use garimpo_llm::MockExtractor;
use garimpo_store::FsRepository;
use std::time::Duration;

const CARD: &str = "ORDEM DOS ADVOGADOS DO BRASIL\n\
                    Nome: SON GOKU\n\
                    Inscrição: 101943\n\
                    Seccional: PR\n\
                    Categoria: ADVOGADO\n\
                    Validade: 12/05/2024\n";

fn card_schema() -> Schema {
    [
        ("nome", "Nome do profissional"),
        ("inscricao", "Número de inscrição"),
        ("seccional", "Seccional"),
        ("categoria", "Categoria (ADVOGADO, ADVOGADA, SUPLEMENTAR)"),
        ("validade", "Data de validade"),
    ]
    .into_iter()
    .collect()
}

/// Schema no fixed heuristic can resolve against the card text.
fn opaque_schema() -> Schema {
    [("subsecao", "Subseção"), ("orgao", "Órgão emissor")]
        .into_iter()
        .collect()
}

fn full_card_record() -> FieldRecord {
    let mut r = FieldRecord::new();
    r.set("nome", Some("SON GOKU".into()));
    r.set("inscricao", Some("101943".into()));
    r.set("seccional", Some("PR".into()));
    r.set("categoria", Some("ADVOGADO".into()));
    r.set("validade", Some("12/05/2024".into()));
    r
}

fn engine_with(
    root: &std::path::Path,
    mock: MockExtractor,
    config: EngineConfig,
) -> Orchestrator<MockExtractor> {
    let repo = FsRepository::open(root).unwrap();
    Orchestrator::new(config, repo, mock)
}

fn item(label: &str, schema: Schema) -> DocumentInput {
    DocumentInput {
        label: label.into(),
        schema,
        bytes: CARD.as_bytes().to_vec(),
    }
}

fn config(per_item_s: f64) -> EngineConfig {
    EngineConfig {
        per_item_budget_s: per_item_s,
        ..Default::default()
    }
}

#[tokio::test]
async fn cold_warm_up_converges_to_fast_path() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record());
    let engine = engine_with(dir.path(), mock.clone(), config(10.0));

    // Item 1: new label, heuristic handles it, learning runs behind.
    let first = engine
        .run_batch(&Utf8TextSource, vec![item("carteira_oab", card_schema())])
        .await;
    assert_eq!(first[0].path, Some(ExtractionPath::ColdHeuristic));
    assert!(!first[0].cache_hit);
    assert_eq!(first[0].estimated_cost, 0.0);

    engine.jobs().wait_idle().await;
    let learned = engine.repository().get("carteira_oab").unwrap().unwrap();
    assert_eq!(learned.version, 1);
    assert_eq!(mock.extract_all_calls(), 1); // background gabarito only

    // Items 2 and 3: fast path, identical records, zero model traffic.
    let later = engine
        .run_batch(
            &Utf8TextSource,
            vec![
                item("carteira_oab", card_schema()),
                item("carteira_oab", card_schema()),
            ],
        )
        .await;
    for outcome in &later {
        assert_eq!(outcome.path, Some(ExtractionPath::CachedAccepted));
        assert!(outcome.cache_hit);
        assert_eq!(outcome.estimated_cost, 0.0);
        assert_eq!(outcome.record, full_card_record());
        assert!(outcome.confidence >= 0.8);
    }
    assert_eq!(later[0].record, later[1].record);
    assert_eq!(mock.total_calls(), 1); // fast path never touches the model
}

#[tokio::test]
async fn refinement_fills_missing_field_and_publishes_next_version() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record());
    let engine = engine_with(dir.path(), mock.clone(), config(10.0));

    // Seed v1 knowledge whose parser never learned "categoria".
    let mut parser = ParserPack::new();
    parser.insert("nome", r"Nome:\s*([^\n]+)");
    parser.insert("inscricao", r"Inscrição:\s*(\d{6})");
    parser.insert("seccional", r"Seccional:\s*(\p{L}{2})");
    parser.insert("validade", r"Validade:\s*(\d{2}/\d{2}/\d{4})");
    let mut validation = ValidationPack::new();
    validation.insert(
        "inscricao",
        Predicate::FormatTemplate {
            template: "######".into(),
        },
    );
    engine
        .repository()
        .put(KnowledgeEntry {
            label: "carteira_oab".into(),
            version: 1,
            parser,
            validation,
            gabarito_digest: "0".repeat(64),
            created_at: 0,
        })
        .unwrap();

    let outcomes = engine
        .run_batch(&Utf8TextSource, vec![item("carteira_oab", card_schema())])
        .await;

    // 4 of 5 fields parse and validate: the score sits exactly on the
    // 0.80 accept threshold. The boundary is inclusive, so this is still
    // the fast path and no model call happens.
    assert_eq!(outcomes[0].path, Some(ExtractionPath::CachedAccepted));
    assert_eq!(mock.total_calls(), 0);

    // Drop one more field from the pack so the score falls below accept.
    engine.repository().clear("carteira_oab").unwrap();
    let mut parser = ParserPack::new();
    parser.insert("nome", r"Nome:\s*([^\n]+)");
    parser.insert("inscricao", r"Inscrição:\s*(\d{6})");
    parser.insert("seccional", r"Seccional:\s*(\p{L}{2})");
    engine
        .repository()
        .put(KnowledgeEntry {
            label: "carteira_oab".into(),
            version: 1,
            parser,
            validation: ValidationPack::new(),
            gabarito_digest: "0".repeat(64),
            created_at: 0,
        })
        .unwrap();

    let outcomes = engine
        .run_batch(&Utf8TextSource, vec![item("carteira_oab", card_schema())])
        .await;
    let refined = &outcomes[0];
    assert_eq!(refined.path, Some(ExtractionPath::CachedRefined));
    assert!(refined.cache_hit);
    assert_eq!(mock.extract_missing_calls(), 1);
    assert_eq!(refined.record, full_card_record()); // all fields answered
    assert!(refined.estimated_cost > 0.0);

    // The background refine publishes version 2...
    engine.jobs().wait_idle().await;
    let entry = engine.repository().get("carteira_oab").unwrap().unwrap();
    assert_eq!(entry.version, 2);

    // ...and the next identical request rides it for free.
    let again = engine
        .run_batch(&Utf8TextSource, vec![item("carteira_oab", card_schema())])
        .await;
    assert_eq!(again[0].path, Some(ExtractionPath::CachedAccepted));
    assert_eq!(again[0].record, full_card_record());
    assert_eq!(mock.extract_missing_calls(), 1); // no further calls
}

#[tokio::test]
async fn amortized_budget_lets_a_slow_item_finish() {
    let dir = tempfile::tempdir().unwrap();
    // The model takes longer than one item's share, but less than the
    // slack-stretched deadline funded by the five fast items before it.
    let mock = MockExtractor::new(full_card_record()).with_delay(Duration::from_millis(120));
    let engine = engine_with(dir.path(), mock.clone(), config(0.2));

    // Warm the card label so items 1-5 ride the fast path.
    engine
        .repository()
        .put(seeded_full_entry("carteira_oab"))
        .unwrap();

    let mut items: Vec<DocumentInput> = (0..5)
        .map(|_| item("carteira_oab", card_schema()))
        .collect();
    items.push(item("tela_sistema", opaque_schema()));

    let outcomes = engine.run_batch(&Utf8TextSource, items).await;

    for outcome in &outcomes[..5] {
        assert_eq!(outcome.path, Some(ExtractionPath::CachedAccepted));
    }
    let slow = &outcomes[5];
    assert_eq!(slow.path, Some(ExtractionPath::ColdLlm));
    assert!(!slow.degraded, "the amortized deadline should cover 120ms");
    assert_eq!(mock.extract_all_calls(), 1);
}

#[tokio::test]
async fn exhausted_budget_cancels_the_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record()).with_delay(Duration::from_millis(200));
    let engine = engine_with(dir.path(), mock.clone(), config(0.05));

    let outcomes = engine
        .run_batch(&Utf8TextSource, vec![item("tela_sistema", opaque_schema())])
        .await;

    let outcome = &outcomes[0];
    assert_eq!(outcome.path, Some(ExtractionPath::ColdLlm));
    assert!(outcome.degraded);
    assert!(outcome.confidence < 0.8);
    assert!(outcome.record.is_all_null()); // heuristic had nothing either

    // A cancelled extraction teaches nothing: no v1 appears.
    engine.jobs().wait_idle().await;
    assert!(engine.repository().get("tela_sistema").unwrap().is_none());
}

#[tokio::test]
async fn zero_deadline_skips_dispatch_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record());
    let engine = engine_with(dir.path(), mock.clone(), config(0.0));

    let outcomes = engine
        .run_batch(&Utf8TextSource, vec![item("tela_sistema", opaque_schema())])
        .await;

    assert!(outcomes[0].degraded);
    assert_eq!(outcomes[0].estimated_cost, 0.0);
    assert_eq!(mock.total_calls(), 0, "no dispatch under a zero deadline");
}

#[tokio::test]
async fn invalid_schema_fails_one_item_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record());
    let engine = engine_with(dir.path(), mock, config(10.0));

    let bad_schema: Schema = [("nome completo", "Nome")].into_iter().collect();
    let outcomes = engine
        .run_batch(
            &Utf8TextSource,
            vec![
                item("carteira_oab", card_schema()),
                item("carteira_oab", bad_schema),
                item("carteira_oab", card_schema()),
            ],
        )
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].succeeded());
    assert!(!outcomes[1].succeeded());
    assert!(outcomes[1].error.as_deref().unwrap().contains("identifier"));
    assert!(outcomes[2].succeeded());
}

#[tokio::test]
async fn unreadable_document_fails_one_item_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record());
    let engine = engine_with(dir.path(), mock, config(10.0));

    let mut bad = item("carteira_oab", card_schema());
    bad.bytes = vec![0xff, 0xfe, 0x00];
    let outcomes = engine
        .run_batch(
            &Utf8TextSource,
            vec![bad, item("carteira_oab", card_schema())],
        )
        .await;

    assert!(!outcomes[0].succeeded());
    assert!(outcomes[1].succeeded());
}

#[tokio::test]
async fn corrupt_entry_is_quarantined_and_relearned() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record());
    let engine = engine_with(dir.path(), mock.clone(), config(10.0));

    engine
        .repository()
        .put(seeded_full_entry("carteira_oab"))
        .unwrap();
    // Truncate the live parser file behind the repository's back.
    let parser_file = engine
        .repository()
        .label_dir("carteira_oab")
        .join("parser.v1");
    std::fs::write(&parser_file, b"{\"nome\": \"(").unwrap();

    let outcomes = engine
        .run_batch(&Utf8TextSource, vec![item("carteira_oab", card_schema())])
        .await;

    // Treated as a cold start, answered by the heuristic.
    assert_eq!(outcomes[0].path, Some(ExtractionPath::ColdHeuristic));
    assert!(!outcomes[0].cache_hit);

    // The damaged entry was moved aside, not deleted.
    let quarantined: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".quarantined."))
        .collect();
    assert_eq!(quarantined.len(), 1);

    // And learning was re-enqueued: a fresh v1 lands.
    engine.jobs().wait_idle().await;
    let entry = engine.repository().get("carteira_oab").unwrap().unwrap();
    assert_eq!(entry.version, 1);
    assert_eq!(mock.extract_all_calls(), 1);
}

#[tokio::test]
async fn heuristic_failure_exactly_at_threshold_goes_to_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new(full_card_record());
    let engine = engine_with(dir.path(), mock.clone(), config(10.0));

    // One of two fields resolves heuristically: failure rate 0.50, which
    // is not below the threshold, so the model is called synchronously.
    let schema: Schema = [("inscricao", "Número de inscrição"), ("orgao", "Órgão emissor")]
        .into_iter()
        .collect();
    let outcomes = engine
        .run_batch(&Utf8TextSource, vec![item("carteira_oab", schema)])
        .await;

    assert_eq!(outcomes[0].path, Some(ExtractionPath::ColdLlm));
    assert_eq!(mock.extract_all_calls(), 1);
}

#[tokio::test]
async fn cold_llm_merge_prefers_model_and_keeps_heuristic_fallback() {
    let dir = tempfile::tempdir().unwrap();
    // Model disagrees on "inscricao" and knows nothing about "orgao".
    let mut model_record = FieldRecord::new();
    model_record.set("inscricao", Some("887210".into()));
    model_record.set("orgao", None);
    let mock = MockExtractor::new(model_record);
    let engine = engine_with(dir.path(), mock, config(10.0));

    let schema: Schema = [("inscricao", "Número de inscrição"), ("orgao", "Órgão emissor")]
        .into_iter()
        .collect();
    let outcomes = engine
        .run_batch(&Utf8TextSource, vec![item("carteira_oab", schema)])
        .await;

    // Model value wins the conflict; the heuristic's 101943 is dropped.
    assert_eq!(outcomes[0].record.value("inscricao"), Some("887210"));
    assert!(outcomes[0].record.is_null("orgao"));
}

fn seeded_full_entry(label: &str) -> KnowledgeEntry {
    let mut parser = ParserPack::new();
    parser.insert("nome", r"Nome:\s*([^\n]+)");
    parser.insert("inscricao", r"Inscrição:\s*(\d{6})");
    parser.insert("seccional", r"Seccional:\s*(\p{L}{2})");
    parser.insert("categoria", r"Categoria:\s*(\p{L}+)");
    parser.insert("validade", r"Validade:\s*(\d{2}/\d{2}/\d{4})");
    let mut validation = ValidationPack::new();
    validation.insert(
        "inscricao",
        Predicate::FormatTemplate {
            template: "######".into(),
        },
    );
    validation.insert(
        "validade",
        Predicate::FormatTemplate {
            template: "##/##/####".into(),
        },
    );
    KnowledgeEntry {
        label: label.into(),
        version: 1,
        parser,
        validation,
        gabarito_digest: "0".repeat(64),
        created_at: 0,
    }
}
