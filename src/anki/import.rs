// # Package Import - Orchestrator
//
// Coordinates the bridge components in order:
// PackageReader -> CollectionParser -> SchemaMapper / DeckHierarchyResolver
// -> DuplicateResolver / SchedulingTranslator per note and card
// -> MediaTransferer -> commit.
//
// All internal writes for one import execute inside a single
// transaction; any fatal error rolls the whole operation back. The
// scratch directory is removed when the reader drops, on every path.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::anki::archive::PackageReader;
use crate::anki::collection::{CollectionParser, PackageCollection};
use crate::anki::decks::DeckHierarchyResolver;
use crate::anki::dedupe::{field_checksum, strip_markup, DuplicateAction, DuplicateResolver};
use crate::anki::error::PackageError;
use crate::anki::media::MediaTransferer;
use crate::anki::scheduling::{InternalScheduling, SchedulingTranslator};
use crate::anki::schema::SchemaMapper;
use crate::anki::types::{IdMap, ImportOptions, ImportReport};
use crate::config::BridgeConfig;
use crate::db::client::StoreTx;
use crate::db::{Database, DbCard, DbNote};

/// Imports a package archive into the internal store for one user
pub struct Importer {
    database: Database,
    config: BridgeConfig,
}

impl Importer {
    pub fn new(database: Database, config: BridgeConfig) -> Self {
        Importer { database, config }
    }

    /// Import the package at `path` for `user_id`
    ///
    /// Never panics and never leaves partial state: fatal errors
    /// produce a `success == false` report with exactly that error and
    /// zero database writes; non-fatal errors accumulate in the report
    /// while the operation commits.
    pub async fn import(&self, user_id: &str, path: &Path, options: &ImportOptions) -> ImportReport {
        match self.run(user_id, path, options).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Import of {} failed: {}", path.display(), e);
                ImportReport::failed(e.to_string())
            }
        }
    }

    async fn run(
        &self,
        user_id: &str,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportReport, PackageError> {
        info!("Starting import of {} for user {}", path.display(), user_id);

        // 1. Open and extract the archive. Fails before any database
        //    write; the scratch dir lives until `reader` drops.
        let reader = PackageReader::open(path, self.config.scratch_root.as_deref())?;

        // 2. Parse the embedded database into typed records.
        let collection = CollectionParser::parse(reader.db_path()).await?;

        // 3. All writes from here happen in one transaction.
        let mut tx = self.database.begin().await?;

        let mut ids = IdMap::new();
        let mut errors: Vec<String> = Vec::new();

        // 4. Map models to note types, reusing same-named ones.
        self.map_models(&mut tx, user_id, &collection, &mut ids).await?;

        // 5. Notes before cards: a note is committed before any card
        //    referencing it, by insertion order.
        let mut dedupe = DuplicateResolver::new(options.duplicates);
        let notes_imported = self
            .import_notes(&mut tx, user_id, &collection, &mut ids, &mut dedupe, &mut errors)
            .await?;

        // 6. Cards, resolving decks lazily as they are referenced.
        let cards_imported = self
            .import_cards(&mut tx, user_id, &collection, options, &mut ids, &mut errors)
            .await?;

        // 7. Media payloads and records.
        let mut media_imported = 0;
        if options.import_media {
            let outcome = MediaTransferer::import(
                &mut tx,
                user_id,
                reader.scratch_dir(),
                &self.config.user_media_dir(user_id),
            )
            .await?;
            media_imported = outcome.transferred;
            errors.extend(outcome.warnings);
        }

        // 8. Commit; rollback happens automatically if we errored out
        //    before this point.
        tx.commit().await?;

        let duplicates_skipped = dedupe.skipped();
        info!(
            "Import complete: {} notes, {} cards, {} media, {} duplicates skipped, {} warnings",
            notes_imported,
            cards_imported,
            media_imported,
            duplicates_skipped,
            errors.len()
        );

        // Non-fatal errors leave the report successful only if the
        // import actually landed something
        let success = notes_imported > 0 || errors.is_empty();

        Ok(ImportReport {
            success,
            notes_imported,
            cards_imported,
            media_imported,
            duplicates_skipped,
            errors,
        })
    }

    /// Translate every package model into an internal note type
    ///
    /// A model whose name already exists for the user maps onto the
    /// existing note type instead of minting a duplicate schema.
    async fn map_models(
        &self,
        tx: &mut StoreTx,
        user_id: &str,
        collection: &PackageCollection,
        ids: &mut IdMap,
    ) -> Result<(), PackageError> {
        // Deterministic order regardless of JSON map iteration
        let mut models: Vec<_> = collection.models.values().collect();
        models.sort_by_key(|m| m.id);

        for model in models {
            if let Some(existing) =
                Database::find_note_type_by_name_tx(tx, user_id, &model.name).await?
            {
                debug!("Model {:?} maps onto existing note type", model.name);
                ids.insert_model(model.id, existing.id);
                continue;
            }

            let (note_type, fields, templates) = SchemaMapper::to_internal(user_id, model)?;
            Database::insert_note_type_tx(tx, &note_type, &fields, &templates).await?;
            debug!(
                "Created note type {:?} with {} fields, {} templates",
                note_type.name,
                fields.len(),
                templates.len()
            );
            ids.insert_model(model.id, note_type.id);
        }
        Ok(())
    }

    async fn import_notes(
        &self,
        tx: &mut StoreTx,
        user_id: &str,
        collection: &PackageCollection,
        ids: &mut IdMap,
        dedupe: &mut DuplicateResolver,
        errors: &mut Vec<String>,
    ) -> Result<u32, PackageError> {
        let mut notes_imported = 0u32;

        for package_note in &collection.notes {
            let Some(note_type_id) = ids.model(package_note.model_id).map(str::to_string) else {
                errors.push(format!(
                    "Row mapping error: note {} references model {} missing from metadata",
                    package_note.id, package_note.model_id
                ));
                continue;
            };

            let fields = package_note.field_values();
            let tags = package_note.tag_values();
            let sort_raw = fields.first().cloned().unwrap_or_default();
            let sort_field = strip_markup(&sort_raw);
            // Recomputed, never trusted from the untrusted archive
            let checksum = field_checksum(&sort_raw);

            let existing = Database::find_note_by_checksum_tx(
                tx,
                user_id,
                &note_type_id,
                checksum as i64,
            )
            .await?;

            match dedupe.resolve(existing.as_ref()) {
                DuplicateAction::InsertNew => {
                    let note =
                        DbNote::new(user_id, &note_type_id, &fields, &tags, &sort_field, checksum)?;
                    Database::insert_note_tx(tx, &note).await?;
                    ids.insert_note(package_note.id, note.id);
                    notes_imported += 1;
                }
                DuplicateAction::SkipExisting(existing_id) => {
                    debug!(
                        "Note {} duplicates existing note {}, skipping",
                        package_note.id, existing_id
                    );
                    ids.mark_note_existing(package_note.id, existing_id);
                }
                DuplicateAction::UpdateExisting(existing_id) => {
                    Database::update_note_fields_tx(
                        tx,
                        &existing_id,
                        &serde_json::to_string(&fields)?,
                        &serde_json::to_string(&tags)?,
                        &sort_field,
                        checksum as i64,
                    )
                    .await?;
                    debug!(
                        "Note {} updated existing note {} in place",
                        package_note.id, existing_id
                    );
                    // Existing cards stay; the package's cards for this
                    // note are not re-imported
                    ids.mark_note_existing(package_note.id, existing_id);
                    notes_imported += 1;
                }
            }
        }

        Ok(notes_imported)
    }

    async fn import_cards(
        &self,
        tx: &mut StoreTx,
        user_id: &str,
        collection: &PackageCollection,
        options: &ImportOptions,
        ids: &mut IdMap,
        errors: &mut Vec<String>,
    ) -> Result<u32, PackageError> {
        let mut deck_resolver = DeckHierarchyResolver::new();
        let mut cards_imported = 0u32;
        // Queue positions for cards imported without their scheduling
        let mut fresh_position = 0i64;

        for package_card in &collection.cards {
            if ids.note_resolves_to_existing(package_card.note_id) {
                continue;
            }
            let Some(note_id) = ids.note(package_card.note_id).map(str::to_string) else {
                errors.push(format!(
                    "Row mapping error: card {} references note {} which was not imported",
                    package_card.id, package_card.note_id
                ));
                continue;
            };

            let deck_id = match &options.target_deck_id {
                Some(target) => target.clone(),
                None => match ids.deck(package_card.deck_id) {
                    Some(id) => id.to_string(),
                    None => {
                        let Some(package_deck) = collection.decks.get(&package_card.deck_id) else {
                            errors.push(format!(
                                "Row mapping error: card {} references deck {} missing from metadata",
                                package_card.id, package_card.deck_id
                            ));
                            continue;
                        };
                        let segments = DeckHierarchyResolver::decode(&package_deck.name);
                        match deck_resolver.resolve_or_create(tx, user_id, &segments).await {
                            Ok(id) => {
                                ids.insert_deck(package_card.deck_id, id.clone());
                                id
                            }
                            Err(e) if !e.is_fatal() => {
                                errors.push(e.to_string());
                                continue;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                },
            };

            let scheduling = if options.preserve_scheduling {
                match SchedulingTranslator::to_internal_encoding(package_card, collection.crt) {
                    Ok(s) => s,
                    Err(e) if !e.is_fatal() => {
                        errors.push(e.to_string());
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                let s = InternalScheduling::fresh(fresh_position);
                fresh_position += 1;
                s
            };

            let mut card = DbCard::new_card(&note_id, &deck_id, package_card.ord as i32, 0);
            card.stage = scheduling.stage;
            card.hold = scheduling.hold;
            card.due = scheduling.due;
            card.interval_days = scheduling.interval_days;
            card.difficulty = scheduling.difficulty;
            card.reps = scheduling.reps;
            card.lapses = scheduling.lapses;
            card.position = scheduling.position;

            Database::insert_card_tx(tx, &card).await?;
            ids.insert_card(package_card.id, card.id);
            cards_imported += 1;
        }

        Ok(cards_imported)
    }
}
