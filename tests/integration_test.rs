/// End-to-end integration tests for the ziwei-lore pipeline.
///
/// Covers both paths:
///   Registry → Ingestor (MockFetcher) → Extractor → CorpusStore
///   Rule file → RuleStore → SQLite → Engine → Interpretations
use std::fs;
use std::time::Duration;

use tempfile::tempdir;
use ziwei_lore::chart::{BirthInput, PalaceRole};
use ziwei_lore::config::Config;
use ziwei_lore::corpus::CorpusStore;
use ziwei_lore::db::Db;
use ziwei_lore::db::models::{Phase, Registry, Source, SourceStatus};
use ziwei_lore::engine::Engine;
use ziwei_lore::error::{EngineError, NetworkCause};
use ziwei_lore::fetcher::MockFetcher;
use ziwei_lore::ingest::{Ingestor, QueueFilter};
use ziwei_lore::rules::{Consensus, RuleStore};

const RULES: &str = r#"{"rules": [
    {"id":"tianji-life-good","name":"天機坐命","scope":"star",
     "interpretation":{"zh":"{stars}坐{palace}，機智多謀","en":"{stars} in the {palace}: quick-witted"},
     "dimensions":["personality","career"],"consensus":"consensus",
     "condition":{"stars":["天機"],"palace":"life"}},
    {"id":"tianji-life-restless","name":"天機坐命多變","scope":"star",
     "interpretation":{"zh":"心性不定","en":"restless, changes career often"},
     "dimensions":["career"],"consensus":"disputed",
     "statistics":{"sample_size":48,"match_rate":0.52,"confidence":0.55},
     "condition":{"stars":["天机"],"palace":"命宮"}},
    {"id":"wealth-general","name":"財帛總論","scope":"miscellaneous_combo",
     "interpretation":{"zh":"","en":""},
     "dimensions":["wealth"],"consensus":"minority_view"}
]}"#;

fn birth_1990() -> BirthInput {
    serde_json::from_value(serde_json::json!({
        "year": 1990, "month": 5, "day": 15,
        "hourBranch": "午", "yearStem": "庚", "yearBranch": "午",
        "gender": "male", "calendar": "lunar"
    }))
    .unwrap()
}

fn source(id: &str, priority: u32, note: Option<&str>) -> Source {
    Source {
        id: id.into(),
        name: format!("Source {id}"),
        url: format!("https://{id}.example/"),
        priority,
        scraper_note: note.map(str::to_string),
        phase: Phase::Reference,
        status: SourceStatus::Pending,
        last_scraped: None,
        char_count: 0,
    }
}

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="zh-Hant">
<head><title>紫微斗數入門</title><meta name="description" content="十四主星概說"></head>
<body>
  <nav>首頁 | 紫微 | 聯絡</nav>
  <main>
    <p>紫微斗數以命宮為核心，觀察三方四正的星曜組合。</p>
    <p>天機星主智慧，坐命者心思靈敏，善於謀劃。</p>
    <p>本站其餘頁面皆為一般生活雜記，與此處內容無直接關聯。</p>
  </main>
  <footer>版權所有 紫微學會</footer>
</body>
</html>"#;

/// Chart calculation through the public engine.
#[test]
fn test_chart_for_1990_birth() {
    let engine = Engine::from_config(&Config::default(), RuleStore::new()).unwrap();
    let chart = engine.calculate(&birth_1990()).unwrap();

    assert_eq!(chart.palaces.len(), 12);
    assert_eq!(chart.palaces[0].role, PalaceRole::Life);
    assert!(chart.palaces[0].is_life_palace);
    assert_eq!(chart.palaces.iter().filter(|p| p.is_life_palace).count(), 1);

    // Each star occupies exactly one palace.
    let mut ids: Vec<&str> = chart.stars().map(|s| s.id.as_str()).collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);

    // Deterministic.
    assert_eq!(engine.calculate(&birth_1990()).unwrap(), chart);
}

/// Rules: import → persist → evaluate, contradictions both returned.
#[test]
fn test_rules_to_interpretations() {
    let temp = tempdir().unwrap();
    let seed = temp.path().join("rules.json");
    fs::write(&seed, RULES).unwrap();

    let mut store = RuleStore::new();
    assert_eq!(store.import_file(&seed).unwrap(), 3);

    let mut db = Db::open(temp.path().join("ziwei.db")).unwrap();
    db.save_rules(store.iter()).unwrap();
    let reloaded = RuleStore::from_rules(db.load_rules().unwrap()).unwrap();
    assert_eq!(reloaded.export_json().unwrap(), store.export_json().unwrap());

    let engine = Engine::from_config(&Config::default(), reloaded).unwrap();
    let chart = engine.calculate(&birth_1990()).unwrap();
    let out = engine.evaluate_rules(&chart, None).unwrap();

    let ids: Vec<&str> = out.iter().map(|i| i.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["tianji-life-good", "tianji-life-restless"]);
    assert!((out[0].weight - 0.5).abs() < 1e-9);
    assert!((out[1].weight - 0.33).abs() < 1e-9);
    assert!(out.iter().all(|i| i.in_life_palace));
    assert!(out[0].text.zh.starts_with("天機坐命宮"));

    let strict = engine
        .evaluate_rules(&chart, Some(Consensus::Consensus))
        .unwrap();
    assert_eq!(strict.len(), 1);
}

/// A confidence score with no sample size rejects the whole file.
#[test]
fn test_confidence_without_sample_size_rejected() {
    let bad = r#"[
        {"id":"ok","name":"紫微坐命","scope":"star","interpretation":{"zh":"","en":""},
         "dimensions":["personality"],"consensus":"consensus"},
        {"id":"bad","name":"無樣本","scope":"star","interpretation":{"zh":"","en":""},
         "dimensions":["career"],"consensus":"disputed",
         "statistics":{"confidence":0.9}}
    ]"#;
    let mut store = RuleStore::new();
    let err = store.import_json(bad).unwrap_err();
    assert!(matches!(err, EngineError::Consensus(_)));
    assert!(store.is_empty());
}

/// Rule export → import → export is byte-identical.
#[test]
fn test_rule_export_round_trip() {
    let temp = tempdir().unwrap();
    let mut store = RuleStore::new();
    store.import_json(RULES).unwrap();

    let first = temp.path().join("first.json");
    store.export_file(&first).unwrap();

    let mut again = RuleStore::new();
    again.import_file(&first).unwrap();
    let second = temp.path().join("second.json");
    again.export_file(&second).unwrap();

    assert_eq!(
        fs::read_to_string(&first).unwrap(),
        fs::read_to_string(&second).unwrap()
    );
}

/// Ingestion over a mixed registry: success, paywall, network failure.
#[test]
fn test_ingestion_pipeline() {
    let temp = tempdir().unwrap();
    let corpus = CorpusStore::new(temp.path().join("corpus"));
    let mut db = Db::open_in_memory().unwrap();

    let registry: Registry = serde_json::from_value(serde_json::json!({
        "sources": [
            serde_json::to_value(source("wiki", 1, None)).unwrap(),
            serde_json::to_value(source("club", 2, Some("Paywall, requires manual access"))).unwrap(),
            serde_json::to_value(source("down", 3, None)).unwrap(),
        ]
    }))
    .unwrap();
    for s in &registry.sources {
        s.validate().unwrap();
    }
    db.upsert_sources(&registry.sources).unwrap();

    let fetcher = MockFetcher::new()
        .with_html("https://wiki.example/", PAGE)
        .with_failure("https://down.example/", NetworkCause::Timeout);

    let report = Ingestor::new(&mut db, &fetcher, &corpus, &Config::default())
        .with_delay(Duration::ZERO)
        .run(&QueueFilter::default(), false)
        .unwrap();

    assert_eq!(report.selected, 3);
    assert_eq!(report.scraped, 1);
    assert_eq!(report.skipped_manual, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.stopped_early);

    // The paywalled source is never fetched.
    assert_eq!(
        fetcher.calls(),
        vec!["https://wiki.example/".to_string(), "https://down.example/".to_string()]
    );

    let doc = corpus.load("wiki").unwrap().unwrap();
    assert_eq!(doc.metadata.title.as_deref(), Some("紫微斗數入門"));
    assert_eq!(doc.metadata.language.as_deref(), Some("zh-Hant"));
    assert_eq!(doc.stats.relevant_lines, 2);
    assert!(!doc.content.contains("生活雜記"));
    assert!(doc.stats.relevance_ratio > 0.0 && doc.stats.relevance_ratio < 1.0);
    assert_eq!(corpus.list().unwrap(), vec!["wiki".to_string()]);

    let wiki = db.get_source("wiki").unwrap().unwrap();
    assert_eq!(wiki.status, SourceStatus::Scraped);
    assert_eq!(wiki.char_count, doc.stats.relevant_chars as u64);
    assert_eq!(
        db.get_source("club").unwrap().unwrap().status,
        SourceStatus::SkippedManual
    );
    assert_eq!(
        db.get_source("down").unwrap().unwrap().status,
        SourceStatus::Error
    );
    let errors = db.scrape_errors(Some("down")).unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("timeout"));

    // A second run retries only the unscraped sources.
    let queue: Vec<String> = db
        .source_queue(None)
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(queue, vec!["club", "down"]);
    assert_eq!(db.progress().unwrap().scraped_count, 1);
}

/// A dry run reads the registry through a read-only handle and leaves the file untouched.
#[test]
fn test_dry_run_over_read_only_database() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("ziwei.db");
    let corpus = CorpusStore::new(temp.path().join("corpus"));

    assert!(Db::open_read_only(&path).unwrap().is_none());
    assert!(!path.exists());

    {
        let mut db = Db::open(&path).unwrap();
        db.upsert_sources(&[source("wiki", 1, None)]).unwrap();
    }
    let before = fs::read(&path).unwrap();

    let mut db = Db::open_read_only(&path).unwrap().unwrap();
    let fetcher = MockFetcher::new().with_html("https://wiki.example/", PAGE);
    let report = Ingestor::new(&mut db, &fetcher, &corpus, &Config::default())
        .with_delay(Duration::ZERO)
        .run(&QueueFilter::default(), true)
        .unwrap();
    drop(db);

    assert!(report.dry_run);
    assert_eq!(report.would_fetch, 1);
    assert!(fetcher.calls().is_empty());
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!temp.path().join("corpus").exists());
}

/// MCP-facing engine shared across tasks.
#[tokio::test]
async fn test_engine_is_shareable_across_tasks() {
    let mut store = RuleStore::new();
    store.import_json(RULES).unwrap();
    let engine = std::sync::Arc::new(Engine::from_config(&Config::default(), store).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let chart = engine.calculate(&birth_1990()).unwrap();
                engine.evaluate_rules(&chart, None).unwrap().len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 2);
    }
}
