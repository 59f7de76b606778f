//! Integration tests for BatchSync
//!
//! These tests run the full pipeline against real SQLite files: read the
//! source, map with a FieldMapping, upsert into the destination.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use batchsync::{
    BatchOutcome, BatchSynchronizer, CancellationToken, Conversion, FieldMapping, FieldRule, SourceQuery,
    SqliteDestination, SqliteSource, SyncError, SyncSettings,
};
use rusqlite::Connection;
use tempfile::TempDir;

fn seed_source(path: &Path, count: usize) {
    let conn = Connection::open(path).expect("Failed to open source db");
    conn.execute_batch(
        "CREATE TABLE cards (
            id TEXT NOT NULL,
            name TEXT,
            language TEXT NOT NULL,
            img_url TEXT,
            rarity TEXT
        );",
    )
    .expect("Failed to create source table");

    for i in 0..count {
        let language = if i % 2 == 0 { "en" } else { "ja" };
        conn.execute(
            "INSERT INTO cards VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                format!("OP01-{:03}", i),
                format!("Card {}", i),
                language,
                format!("https://img.example/op01-{:03}.png", i),
                "C",
            ],
        )
        .expect("Failed to insert source row");
    }
}

fn create_destination(path: &Path) {
    let conn = Connection::open(path).expect("Failed to open destination db");
    conn.execute_batch(
        "CREATE TABLE cards (
            card_id TEXT NOT NULL,
            language TEXT NOT NULL,
            card_name TEXT,
            image_srcset TEXT,
            attributes TEXT,
            PRIMARY KEY (card_id, language)
        );",
    )
    .expect("Failed to create destination table");
}

fn dump(path: &Path) -> Vec<(String, String, Option<String>, Option<String>, Option<String>)> {
    let conn = Connection::open(path).expect("Failed to open destination db");
    let mut stmt = conn
        .prepare("SELECT card_id, language, card_name, image_srcset, attributes FROM cards ORDER BY card_id, language")
        .expect("Failed to prepare dump");
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))
        .expect("Failed to query dump")
        .collect::<Result<_, _>>()
        .expect("Failed to read dump")
}

fn mapping() -> FieldMapping {
    FieldMapping {
        fields: vec![
            FieldRule::new("id", "card_id"),
            FieldRule::new("language", "language"),
            FieldRule::new("name", "card_name"),
            FieldRule::new("img_url", "image_srcset")
                .convert(Conversion::Srcset)
                .widths([240, 480]),
        ],
        required: vec!["id".to_string()],
        extension_column: Some("attributes".to_string()),
        ..Default::default()
    }
}

struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    destination: PathBuf,
}

fn fixture(count: usize) -> Fixture {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let source = temp.path().join("local.db");
    let destination = temp.path().join("remote.db");
    seed_source(&source, count);
    create_destination(&destination);
    Fixture {
        _temp: temp,
        source,
        destination,
    }
}

fn synchronizer(fx: &Fixture, settings: SyncSettings) -> BatchSynchronizer {
    BatchSynchronizer::configure(
        settings,
        Arc::new(SqliteSource::new(&fx.source)),
        Arc::new(mapping()),
        Arc::new(SqliteDestination::new(&fx.destination)),
    )
    .expect("Failed to configure synchronizer")
}

fn settings() -> SyncSettings {
    SyncSettings::new(SourceQuery::new("cards").order_by("id"), "cards", ["card_id", "language"])
}

// =============================================================================
// End-to-end runs
// =============================================================================

#[tokio::test]
async fn test_full_run_writes_every_record() {
    let fx = fixture(25);
    let report = synchronizer(&fx, settings().batch_size(10))
        .run()
        .await
        .expect("Run failed");

    let sizes: Vec<usize> = report.batches.iter().map(|b| b.record_count).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(report.is_clean());
    assert_eq!(report.totals.succeeded, 25);

    let rows = dump(&fx.destination);
    assert_eq!(rows.len(), 25);
    let (card_id, language, name, srcset, attributes) = &rows[0];
    assert_eq!(card_id, "OP01-000");
    assert_eq!(language, "en");
    assert_eq!(name.as_deref(), Some("Card 0"));
    assert_eq!(
        srcset.as_deref(),
        Some("https://img.example/op01-000.png?w=240 240w, https://img.example/op01-000.png?w=480 480w")
    );
    assert_eq!(attributes.as_deref(), Some(r#"{"rarity":"C"}"#));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let fx = fixture(12);
    let sync = synchronizer(&fx, settings().batch_size(5));

    sync.run().await.expect("First run failed");
    let first = dump(&fx.destination);

    let report = sync.run().await.expect("Second run failed");
    assert!(report.is_clean());
    assert_eq!(dump(&fx.destination), first);
}

#[tokio::test]
async fn test_rerun_updates_changed_rows() {
    let fx = fixture(3);
    let sync = synchronizer(&fx, settings());
    sync.run().await.expect("First run failed");

    Connection::open(&fx.source)
        .expect("Failed to open source db")
        .execute("UPDATE cards SET name = 'Renamed' WHERE id = 'OP01-001'", [])
        .expect("Failed to update source");
    sync.run().await.expect("Second run failed");

    let rows = dump(&fx.destination);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].2.as_deref(), Some("Renamed"));
}

#[tokio::test]
async fn test_language_filter_selects_subset() {
    let fx = fixture(10);
    let query = SourceQuery::new("cards").filter("language", "ja").order_by("id");
    let sync = synchronizer(
        &fx,
        SyncSettings::new(query, "cards", ["card_id", "language"]),
    );

    let report = sync.run().await.expect("Run failed");
    assert_eq!(report.source_records, 5);
    assert!(dump(&fx.destination).iter().all(|row| row.1 == "ja"));
}

#[tokio::test]
async fn test_dry_run_leaves_destination_untouched() {
    let fx = fixture(8);
    let report = synchronizer(&fx, settings().batch_size(3).dry_run(true))
        .run()
        .await
        .expect("Run failed");

    assert_eq!(report.batches.len(), 3);
    assert!(
        report
            .batches
            .iter()
            .all(|b| b.outcome == BatchOutcome::Success { simulated: true })
    );
    assert!(dump(&fx.destination).is_empty());
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_source_is_fatal() {
    let fx = fixture(1);
    let settings = settings();
    let sync = BatchSynchronizer::configure(
        settings,
        Arc::new(SqliteSource::new(fx.source.with_file_name("missing.db"))),
        Arc::new(mapping()),
        Arc::new(SqliteDestination::new(&fx.destination)),
    )
    .expect("Failed to configure synchronizer");

    let result = sync.run().await;
    assert!(matches!(result, Err(SyncError::SourceRead(_))));
}

#[tokio::test]
async fn test_missing_destination_table_fails_batches_not_run() {
    let fx = fixture(6);
    let sync = BatchSynchronizer::configure(
        SyncSettings::new(SourceQuery::new("cards"), "no_such_table", ["card_id", "language"]).batch_size(2),
        Arc::new(SqliteSource::new(&fx.source)),
        Arc::new(mapping()),
        Arc::new(SqliteDestination::new(&fx.destination)),
    )
    .expect("Failed to configure synchronizer");

    let report = sync.run().await.expect("Run failed");
    assert_eq!(report.batches.len(), 3);
    assert_eq!(report.failed_batches(), vec![0, 1, 2]);
    assert_eq!(report.totals.failed, 6);
}

#[tokio::test]
async fn test_retry_selected_batches_after_fix() {
    let fx = fixture(6);
    let sync = BatchSynchronizer::configure(
        settings().batch_size(2),
        Arc::new(SqliteSource::new(&fx.source)),
        Arc::new(mapping()),
        Arc::new(SqliteDestination::new(fx.destination.with_file_name("later.db"))),
    )
    .expect("Failed to configure synchronizer");

    // destination file exists but has no table yet
    let first = sync.run().await.expect("Run failed");
    assert_eq!(first.failed_batches(), vec![0, 1, 2]);

    create_destination(&fx.destination.with_file_name("later.db"));
    let failed: BTreeSet<usize> = first.failed_batches().into_iter().collect();
    let retry = sync
        .run_selected(&failed, &CancellationToken::new())
        .await
        .expect("Retry failed");

    assert!(retry.batches.iter().all(|b| b.outcome.is_success()));
    assert_eq!(dump(&fx.destination.with_file_name("later.db")).len(), 6);
}
