mod support;

use cardbox::anki::{ExportOptions, ImportOptions};
use tempfile::TempDir;

use crate::support::{test_library, tracing_init, FixtureCard, PackageBuilder};

const JPEG_BYTES: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46];

async fn media_package(dir: &TempDir, name: &str) -> std::path::PathBuf {
    PackageBuilder::new()
        .basic_model(200, "Basic")
        .deck(100, "Spanish")
        .note(
            1001,
            200,
            &["hablar <img src=\"cat.jpg\">", "to speak"],
            "",
        )
        .card(FixtureCard::fresh(2001, 1001, 100, 0))
        .media_file("cat.jpg", JPEG_BYTES)
        .write(&dir.path().join(name))
        .await
}

#[tokio::test]
async fn media_payloads_land_under_their_real_names() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = media_package(&root, "media.apkg").await;

    let report = library
        .import_package("alice", &package, &ImportOptions::with_media())
        .await;

    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.media_imported, 1);
    assert!(report.errors.is_empty());

    let stored = root.path().join("media").join("alice").join("cat.jpg");
    assert_eq!(std::fs::read(&stored).unwrap(), JPEG_BYTES);

    let records = library.get_media_for_user("alice").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].filename, "cat.jpg");
    assert_eq!(records[0].mime_type, "image/jpeg");
    assert_eq!(records[0].size_bytes, JPEG_BYTES.len() as i64);
}

#[tokio::test]
async fn media_is_skipped_unless_requested() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = media_package(&root, "media.apkg").await;

    let report = library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    assert!(report.success);
    assert_eq!(report.media_imported, 0);
    assert!(library.get_media_for_user("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn reimport_deduplicates_media_by_filename() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = media_package(&root, "media.apkg").await;

    library
        .import_package("alice", &package, &ImportOptions::with_media())
        .await;
    let second = library
        .import_package("alice", &package, &ImportOptions::with_media())
        .await;

    assert!(second.success);
    assert_eq!(second.media_imported, 0);
    assert!(second.errors.is_empty());
    assert_eq!(library.get_media_for_user("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn unsafe_and_disallowed_filenames_are_warnings() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;

    let package = PackageBuilder::new()
        .basic_model(200, "Basic")
        .deck(100, "Spanish")
        .note(1001, 200, &["hablar", "to speak"], "")
        .card(FixtureCard::fresh(2001, 1001, 100, 0))
        .media_file("../evil.jpg", b"nope")
        .media_file("script.exe", b"nope")
        .media_file("cat.jpg", JPEG_BYTES)
        .write(&root.path().join("hostile.apkg"))
        .await;

    let report = library
        .import_package("alice", &package, &ImportOptions::with_media())
        .await;

    // The hostile entries are reported, the clean one still lands, and
    // nothing escapes the media directory
    assert!(report.success);
    assert_eq!(report.media_imported, 1);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().any(|e| e.contains("evil.jpg")));
    assert!(report.errors.iter().any(|e| e.contains("script.exe")));
    assert!(!root.path().join("media").join("evil.jpg").exists());
    assert_eq!(library.get_media_for_user("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn referenced_media_round_trips_through_export() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = media_package(&root, "media.apkg").await;
    library
        .import_package("alice", &package, &ImportOptions::with_media())
        .await;

    let decks = library.get_decks_for_user("alice").await.unwrap();
    let output = root.path().join("out.apkg");
    library
        .export_decks(
            "alice",
            &[decks[0].id.clone()],
            &output,
            &ExportOptions::default(),
        )
        .await
        .unwrap();

    let other_root = TempDir::new().unwrap();
    let other = test_library(&other_root).await;
    let report = other
        .import_package("bob", &output, &ImportOptions::with_media())
        .await;

    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.media_imported, 1);
    let stored = other_root.path().join("media").join("bob").join("cat.jpg");
    assert_eq!(std::fs::read(&stored).unwrap(), JPEG_BYTES);
}

#[tokio::test]
async fn export_can_leave_media_out() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = media_package(&root, "media.apkg").await;
    library
        .import_package("alice", &package, &ImportOptions::with_media())
        .await;

    let decks = library.get_decks_for_user("alice").await.unwrap();
    let output = root.path().join("no_media.apkg");
    let options = ExportOptions {
        include_media: false,
        ..Default::default()
    };
    library
        .export_decks("alice", &[decks[0].id.clone()], &output, &options)
        .await
        .unwrap();

    let other_root = TempDir::new().unwrap();
    let other = test_library(&other_root).await;
    let report = other
        .import_package("bob", &output, &ImportOptions::with_media())
        .await;

    assert!(report.success);
    assert_eq!(report.media_imported, 0);
    assert!(other.get_media_for_user("bob").await.unwrap().is_empty());
}
