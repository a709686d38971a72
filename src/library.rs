use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::anki::{ExportOptions, Exporter, ImportOptions, ImportReport, Importer, PackageError};
use crate::config::BridgeConfig;
use crate::db::{Database, DbCard, DbDeck, DbMediaRecord, DbNote, DbNoteType};

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Package error: {0}")]
    Package(#[from] PackageError),
}

/// The main library manager for database operations and the package
/// bridge
///
/// Handles:
/// - Query methods for note types, decks, notes, cards, and media
/// - Package import/export entry points
/// - Access to the underlying database handle
#[derive(Debug, Clone)]
pub struct LibraryManager {
    database: Database,
    config: BridgeConfig,
}

impl LibraryManager {
    /// Create a new library manager
    pub fn new(database: Database, config: BridgeConfig) -> Self {
        LibraryManager { database, config }
    }

    /// The underlying database handle
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Import a package archive into a user's collection
    ///
    /// Always returns a report; a fatal failure yields `success ==
    /// false` with the error message and no database writes.
    pub async fn import_package(
        &self,
        user_id: &str,
        path: &Path,
        options: &ImportOptions,
    ) -> ImportReport {
        Importer::new(self.database.clone(), self.config.clone())
            .import(user_id, path, options)
            .await
    }

    /// Export the named decks (and their descendants) as a package
    pub async fn export_decks(
        &self,
        user_id: &str,
        deck_ids: &[String],
        output_path: &Path,
        options: &ExportOptions,
    ) -> Result<PathBuf, LibraryError> {
        let exporter = Exporter::new(self.database.clone(), self.config.clone());
        Ok(exporter.export(user_id, deck_ids, output_path, options).await?)
    }

    /// Export a user's entire collection as a full backup
    pub async fn export_collection(
        &self,
        user_id: &str,
        output_path: &Path,
    ) -> Result<PathBuf, LibraryError> {
        let exporter = Exporter::new(self.database.clone(), self.config.clone());
        Ok(exporter.export_collection(user_id, output_path).await?)
    }

    /// Get a note type by id
    pub async fn get_note_type(&self, id: &str) -> Result<Option<DbNoteType>, LibraryError> {
        Ok(self.database.get_note_type(id).await?)
    }

    /// Get a deck by id
    pub async fn get_deck(&self, id: &str) -> Result<Option<DbDeck>, LibraryError> {
        Ok(self.database.get_deck(id).await?)
    }

    /// Get all decks for a user
    pub async fn get_decks_for_user(&self, user_id: &str) -> Result<Vec<DbDeck>, LibraryError> {
        Ok(self.database.get_decks_for_user(user_id).await?)
    }

    /// Get a note by id
    pub async fn get_note(&self, id: &str) -> Result<Option<DbNote>, LibraryError> {
        Ok(self.database.get_note(id).await?)
    }

    /// Get all cards in a deck
    pub async fn get_cards_in_deck(&self, deck_id: &str) -> Result<Vec<DbCard>, LibraryError> {
        Ok(self.database.get_cards_in_deck(deck_id).await?)
    }

    /// Get cards for a note
    pub async fn get_cards_for_note(&self, note_id: &str) -> Result<Vec<DbCard>, LibraryError> {
        Ok(self.database.get_cards_for_note(note_id).await?)
    }

    /// Get all media records for a user
    pub async fn get_media_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<DbMediaRecord>, LibraryError> {
        Ok(self.database.get_media_for_user(user_id).await?)
    }
}
