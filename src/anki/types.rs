use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How to handle an incoming note whose sort field matches an
/// existing note of the same note type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the existing note untouched and count a skip
    #[default]
    Skip,
    /// Overwrite the existing note's field values in place
    Update,
    /// Always insert a new note regardless of any match
    ImportAsNew,
}

/// Options for one package import
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Route every card to this deck instead of resolving the
    /// package's deck names
    pub target_deck_id: Option<String>,
    pub duplicates: DuplicatePolicy,
    pub import_media: bool,
    /// Keep the package's scheduling state; when false every card is
    /// imported as a fresh new card
    pub preserve_scheduling: bool,
}

impl ImportOptions {
    pub fn with_media() -> Self {
        ImportOptions {
            import_media: true,
            ..Default::default()
        }
    }
}

/// Options for one package export
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub include_scheduling: bool,
    pub include_media: bool,
    pub include_tags: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            include_scheduling: true,
            include_media: true,
            include_tags: true,
        }
    }
}

/// Result of one package import
///
/// Non-fatal errors collected alongside at least one imported note
/// leave `success` true; a fatal error yields `success == false` with
/// exactly that error and zero counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub notes_imported: u32,
    pub cards_imported: u32,
    pub media_imported: u32,
    pub duplicates_skipped: u32,
    pub errors: Vec<String>,
}

impl ImportReport {
    /// Report for a fatal error: nothing was written
    pub fn failed(error: String) -> Self {
        ImportReport {
            success: false,
            errors: vec![error],
            ..Default::default()
        }
    }
}

/// Operation-scoped translation tables between package integer ids and
/// internal uuid ids
///
/// Lives exactly as long as one import or export call; never persisted
/// and never shared between operations. Each entity kind has its own
/// table because the package format does not share an id namespace
/// across tables.
#[derive(Debug, Default)]
pub struct IdMap {
    models: HashMap<i64, String>,
    decks: HashMap<i64, String>,
    notes: HashMap<i64, String>,
    cards: HashMap<i64, String>,
    /// Package note ids resolved to an existing internal note (skip
    /// or update policy); their cards are not imported
    existing_notes: HashMap<i64, String>,
}

impl IdMap {
    pub fn new() -> Self {
        IdMap::default()
    }

    pub fn insert_model(&mut self, package_id: i64, internal_id: String) {
        self.models.insert(package_id, internal_id);
    }

    pub fn model(&self, package_id: i64) -> Option<&str> {
        self.models.get(&package_id).map(String::as_str)
    }

    pub fn insert_deck(&mut self, package_id: i64, internal_id: String) {
        self.decks.insert(package_id, internal_id);
    }

    pub fn deck(&self, package_id: i64) -> Option<&str> {
        self.decks.get(&package_id).map(String::as_str)
    }

    pub fn insert_note(&mut self, package_id: i64, internal_id: String) {
        self.notes.insert(package_id, internal_id);
    }

    pub fn note(&self, package_id: i64) -> Option<&str> {
        self.notes.get(&package_id).map(String::as_str)
    }

    pub fn insert_card(&mut self, package_id: i64, internal_id: String) {
        self.cards.insert(package_id, internal_id);
    }

    pub fn card(&self, package_id: i64) -> Option<&str> {
        self.cards.get(&package_id).map(String::as_str)
    }

    pub fn mark_note_existing(&mut self, package_id: i64, existing_id: String) {
        self.existing_notes.insert(package_id, existing_id);
    }

    pub fn note_resolves_to_existing(&self, package_id: i64) -> bool {
        self.existing_notes.contains_key(&package_id)
    }
}
