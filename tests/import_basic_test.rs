mod support;

use cardbox::anki::{field_checksum, ImportOptions};
use cardbox::db::{Hold, NoteTypeKind, Stage};
use tempfile::TempDir;

use crate::support::{test_library, tracing_init, FixtureCard, PackageBuilder};

/// A package with one subdeck ("Spanish::Verbs"), one basic model, and
/// three notes with one card each, all in the subdeck
async fn spanish_verbs_package(dir: &TempDir) -> std::path::PathBuf {
    PackageBuilder::new()
        .basic_model(200, "Basic")
        .deck(1, "Default")
        .deck(100, "Spanish::Verbs")
        .note(1001, 200, &["hablar", "to speak"], " spanish verbs ")
        .note(1002, 200, &["comer", "to eat"], " spanish verbs ")
        .note(1003, 200, &["vivir", "to live"], "")
        .card(FixtureCard::fresh(2001, 1001, 100, 0))
        .card(FixtureCard::fresh(2002, 1002, 100, 1))
        .card(FixtureCard::fresh(2003, 1003, 100, 2))
        .write(&dir.path().join("spanish.apkg"))
        .await
}

#[tokio::test]
async fn import_creates_decks_notes_and_cards() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = spanish_verbs_package(&root).await;

    let report = library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    assert!(report.success);
    assert_eq!(report.notes_imported, 3);
    assert_eq!(report.cards_imported, 3);
    assert_eq!(report.duplicates_skipped, 0);
    assert!(report.errors.is_empty(), "unexpected: {:?}", report.errors);

    // The metadata's Default deck is never referenced by a card, so
    // only the two decks on the Spanish::Verbs path exist
    let decks = library.get_decks_for_user("alice").await.unwrap();
    assert_eq!(decks.len(), 2);
    let spanish = decks.iter().find(|d| d.name == "Spanish").unwrap();
    let verbs = decks.iter().find(|d| d.name == "Verbs").unwrap();
    assert_eq!(spanish.parent_id, None);
    assert_eq!(verbs.parent_id, Some(spanish.id.clone()));

    let cards = library.get_cards_in_deck(&verbs.id).await.unwrap();
    assert_eq!(cards.len(), 3);
    assert!(library.get_cards_in_deck(&spanish.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn import_preserves_note_content_and_schema() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = spanish_verbs_package(&root).await;

    library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    let decks = library.get_decks_for_user("alice").await.unwrap();
    let verbs = decks.iter().find(|d| d.name == "Verbs").unwrap();
    let cards = library.get_cards_in_deck(&verbs.id).await.unwrap();

    let mut notes = Vec::new();
    for card in &cards {
        notes.push(library.get_note(&card.note_id).await.unwrap().unwrap());
    }
    let hablar = notes.iter().find(|n| n.sort_field == "hablar").unwrap();
    assert_eq!(hablar.field_values().unwrap(), vec!["hablar", "to speak"]);
    assert_eq!(hablar.tag_values().unwrap(), vec!["spanish", "verbs"]);
    assert_eq!(hablar.checksum, field_checksum("hablar") as i64);

    let note_type = library
        .get_note_type(&hablar.note_type_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(note_type.name, "Basic");
    assert_eq!(note_type.kind, NoteTypeKind::Standard);

    let fields = library
        .database()
        .get_fields_for_note_type(&note_type.id)
        .await
        .unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].name, "Front");
    assert_eq!(fields[0].ord, 0);
    assert!(fields[0].required && fields[0].is_unique);
    assert_eq!(fields[1].name, "Back");

    let templates = library
        .database()
        .get_templates_for_note_type(&note_type.id)
        .await
        .unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].question_format, "{{Front}}");
}

#[tokio::test]
async fn imported_cards_start_fresh_by_default() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = spanish_verbs_package(&root).await;

    library
        .import_package("alice", &package, &ImportOptions::default())
        .await;

    let decks = library.get_decks_for_user("alice").await.unwrap();
    let verbs = decks.iter().find(|d| d.name == "Verbs").unwrap();
    for card in library.get_cards_in_deck(&verbs.id).await.unwrap() {
        assert_eq!(card.stage, Stage::New);
        assert_eq!(card.hold, Hold::Active);
        assert_eq!(card.due, None);
        assert_eq!(card.reps, 0);
        assert_eq!(card.interval_days, 0);
    }
}

#[tokio::test]
async fn target_deck_overrides_package_deck_names() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = spanish_verbs_package(&root).await;

    // A pre-existing deck the caller routes everything into
    let inbox = cardbox::db::DbDeck::new("alice", None, "Inbox");
    let mut tx = library.database().begin().await.unwrap();
    cardbox::db::Database::insert_deck_tx(&mut tx, &inbox).await.unwrap();
    tx.commit().await.unwrap();

    let options = ImportOptions {
        target_deck_id: Some(inbox.id.clone()),
        ..Default::default()
    };
    let report = library.import_package("alice", &package, &options).await;

    assert!(report.success);
    assert_eq!(report.cards_imported, 3);
    assert_eq!(
        library.get_cards_in_deck(&inbox.id).await.unwrap().len(),
        3
    );
    // No Spanish/Verbs decks were materialized
    let decks = library.get_decks_for_user("alice").await.unwrap();
    assert_eq!(decks.len(), 1);
}

#[tokio::test]
async fn users_are_isolated() {
    tracing_init();
    let root = TempDir::new().unwrap();
    let library = test_library(&root).await;
    let package = spanish_verbs_package(&root).await;

    library
        .import_package("alice", &package, &ImportOptions::default())
        .await;
    let report = library
        .import_package("bob", &package, &ImportOptions::default())
        .await;

    // Bob's import sees none of Alice's notes as duplicates
    assert_eq!(report.notes_imported, 3);
    assert_eq!(report.duplicates_skipped, 0);
    assert_eq!(library.database().count_notes_for_user("alice").await.unwrap(), 3);
    assert_eq!(library.database().count_notes_for_user("bob").await.unwrap(), 3);
    assert_eq!(library.get_decks_for_user("bob").await.unwrap().len(), 2);
}
