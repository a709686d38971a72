mod support;

use cardbox::anki::ImportOptions;
use tempfile::TempDir;

use crate::support::{test_library, tracing_init, FixtureCard, PackageBuilder};

#[tokio::test]
async fn missing_file_fails_cleanly() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;

    let report = library
        .import_package(
            "alice",
            &root.path().join("nope.apkg"),
            &ImportOptions::default(),
        )
        .await;

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("not found"), "{:?}", report.errors);
    assert_eq!(report.notes_imported, 0);
}

#[tokio::test]
async fn non_zip_file_fails_cleanly() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let path = root.path().join("garbage.apkg");
    std::fs::write(&path, b"this is not an archive").unwrap();

    let report = library
        .import_package("alice", &path, &ImportOptions::default())
        .await;

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("zip"), "{:?}", report.errors);
}

#[tokio::test]
async fn missing_metadata_row_writes_nothing() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;

    let package = PackageBuilder::new()
        .basic_model(200, "Basic")
        .deck(100, "Spanish")
        .note(1001, 200, &["hablar", "to speak"], "")
        .card(FixtureCard::fresh(2001, 1001, 100, 0))
        .without_metadata_row()
        .write(&root.path().join("headless.apkg"))
        .await;

    let report = library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(
        report.errors[0].contains("metadata row is missing"),
        "{:?}",
        report.errors
    );
    // Nothing was written despite valid-looking note and card rows
    assert_eq!(library.database().count_notes_for_user("alice").await.unwrap(), 0);
    assert!(library.get_decks_for_user("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn unexpected_version_is_a_schema_error() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;

    let package = PackageBuilder::new()
        .basic_model(200, "Basic")
        .version(99)
        .write(&root.path().join("future.apkg"))
        .await;

    let report = library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    assert!(!report.success);
    assert!(report.errors[0].contains("version"), "{:?}", report.errors);
}

#[tokio::test]
async fn dangling_model_reference_is_non_fatal() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;

    let package = PackageBuilder::new()
        .basic_model(200, "Basic")
        .deck(100, "Spanish")
        .note(1001, 999, &["orphan", "note"], "")
        .note(1002, 200, &["hablar", "to speak"], "")
        .card(FixtureCard::fresh(2001, 1001, 100, 0))
        .card(FixtureCard::fresh(2002, 1002, 100, 1))
        .write(&root.path().join("dangling_model.apkg"))
        .await;

    let report = library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    // The bad note and its card are reported; the good row pair lands
    assert!(report.success);
    assert_eq!(report.notes_imported, 1);
    assert_eq!(report.cards_imported, 1);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].contains("model 999"), "{:?}", report.errors);
}

#[tokio::test]
async fn dangling_deck_reference_is_non_fatal() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;

    let package = PackageBuilder::new()
        .basic_model(200, "Basic")
        .deck(100, "Spanish")
        .note(1001, 200, &["hablar", "to speak"], "")
        .card(FixtureCard::fresh(2001, 1001, 555, 0))
        .write(&root.path().join("dangling_deck.apkg"))
        .await;

    let report = library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    assert!(report.success);
    assert_eq!(report.notes_imported, 1);
    assert_eq!(report.cards_imported, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("deck 555"), "{:?}", report.errors);
}

#[tokio::test]
async fn unknown_scheduling_stage_is_non_fatal() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;

    let mut bad = FixtureCard::fresh(2001, 1001, 100, 0);
    bad.ctype = 9;
    let package = PackageBuilder::new()
        .basic_model(200, "Basic")
        .deck(100, "Spanish")
        .note(1001, 200, &["hablar", "to speak"], "")
        .card(bad)
        .write(&root.path().join("bad_stage.apkg"))
        .await;

    let options = ImportOptions {
        preserve_scheduling: true,
        ..Default::default()
    };
    let report = library.import_package("alice", &package, &options).await;

    assert!(report.success);
    assert_eq!(report.notes_imported, 1);
    assert_eq!(report.cards_imported, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(
        report.errors[0].contains("unknown scheduling stage"),
        "{:?}",
        report.errors
    );
}
