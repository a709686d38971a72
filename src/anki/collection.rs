use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::anki::error::PackageError;

/// Unit separator joining field values in the package's notes table
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// Collection schema version this bridge reads and writes
pub const COLLECTION_VERSION: i64 = 11;

/// One model (note type) from the package's JSON-encoded models column
///
/// The metadata is schema-in-a-cell: it is decoded into these explicit
/// structures at read time and validated there, never passed around as
/// an opaque blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageModel {
    pub id: i64,
    pub name: String,
    /// Type discriminator: 0 = standard, 1 = cloze
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(default)]
    pub flds: Vec<PackageField>,
    #[serde(default)]
    pub tmpls: Vec<PackageTemplate>,
    #[serde(default)]
    pub css: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageField {
    pub name: String,
    pub ord: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageTemplate {
    pub name: String,
    pub ord: i64,
    /// Question (front) format string referencing field placeholders
    #[serde(default)]
    pub qfmt: String,
    /// Answer (back) format string
    #[serde(default)]
    pub afmt: String,
}

/// One deck from the package's JSON-encoded decks column
///
/// The name is a flat `::`-joined hierarchy path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageDeck {
    pub id: i64,
    pub name: String,
}

/// One row of the package's notes table
#[derive(Debug, Clone, PartialEq)]
pub struct PackageNote {
    pub id: i64,
    pub guid: String,
    /// Model id (`mid`)
    pub model_id: i64,
    /// Space-delimited tag string
    pub tags: String,
    /// Field values joined by `FIELD_SEPARATOR`
    pub fields: String,
    pub checksum: i64,
}

impl PackageNote {
    pub fn field_values(&self) -> Vec<String> {
        self.fields
            .split(FIELD_SEPARATOR)
            .map(|s| s.to_string())
            .collect()
    }

    pub fn tag_values(&self) -> Vec<String> {
        self.tags
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }
}

/// One row of the package's cards table
#[derive(Debug, Clone, PartialEq)]
pub struct PackageCard {
    pub id: i64,
    /// Note id (`nid`)
    pub note_id: i64,
    /// Deck id (`did`)
    pub deck_id: i64,
    /// Template ordinal
    pub ord: i64,
    /// Scheduling stage discriminator (`type` column)
    pub ctype: i64,
    /// Queue: overloads suspension (-1) and bury (-2/-3) onto the
    /// stage integer
    pub queue: i64,
    /// New: queue position. Learning: epoch seconds. Review: days
    /// since the collection's `crt`.
    pub due: i64,
    pub interval: i64,
    pub factor: i64,
    pub reps: i64,
    pub lapses: i64,
}

/// Parsed package contents
///
/// `crt` (creation epoch, seconds) is the day-zero reference for every
/// review card's due value. It is read exactly once per operation and
/// never recomputed mid-operation.
#[derive(Debug)]
pub struct PackageCollection {
    pub crt: i64,
    pub models: HashMap<i64, PackageModel>,
    pub decks: HashMap<i64, PackageDeck>,
    pub notes: Vec<PackageNote>,
    pub cards: Vec<PackageCard>,
}

/// Opens the embedded database read-only and decodes it into a
/// `PackageCollection`
pub struct CollectionParser;

impl CollectionParser {
    /// Parse the embedded database at `db_path`
    ///
    /// Fails with `Schema` if the metadata row is missing, the version
    /// is unexpected, or the models/decks JSON cannot be decoded as
    /// the expected shape. No partial collection is ever produced from
    /// malformed metadata.
    pub async fn parse(db_path: &Path) -> Result<PackageCollection, PackageError> {
        let url = format!("sqlite://{}?mode=ro", db_path.display());
        let pool = SqlitePool::connect(&url).await.map_err(|e| {
            PackageError::Archive(format!("cannot open embedded database: {}", e))
        })?;

        let result = Self::parse_with_pool(&pool).await;
        pool.close().await;
        result
    }

    async fn parse_with_pool(pool: &SqlitePool) -> Result<PackageCollection, PackageError> {
        let col = sqlx::query("SELECT crt, ver, models, decks FROM col LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| PackageError::Schema(format!("cannot read col table: {}", e)))?
            .ok_or_else(|| PackageError::Schema("metadata row is missing".to_string()))?;

        let ver: i64 = col.get("ver");
        if ver != COLLECTION_VERSION {
            return Err(PackageError::Schema(format!(
                "unexpected collection version {} (expected {})",
                ver, COLLECTION_VERSION
            )));
        }

        let crt: i64 = col.get("crt");

        let models_json: String = col.get("models");
        let models_by_key: HashMap<String, PackageModel> = serde_json::from_str(&models_json)
            .map_err(|e| PackageError::Schema(format!("malformed models JSON: {}", e)))?;
        let mut models = HashMap::new();
        for (_, model) in models_by_key {
            Self::validate_model(&model)?;
            models.insert(model.id, model);
        }

        let decks_json: String = col.get("decks");
        let decks_by_key: HashMap<String, PackageDeck> = serde_json::from_str(&decks_json)
            .map_err(|e| PackageError::Schema(format!("malformed decks JSON: {}", e)))?;
        let decks: HashMap<i64, PackageDeck> =
            decks_by_key.into_values().map(|d| (d.id, d)).collect();

        let note_rows = sqlx::query("SELECT id, guid, mid, tags, flds, csum FROM notes")
            .fetch_all(pool)
            .await
            .map_err(|e| PackageError::Schema(format!("cannot read notes table: {}", e)))?;
        let notes: Vec<PackageNote> = note_rows
            .iter()
            .map(|r| PackageNote {
                id: r.get("id"),
                guid: r.get("guid"),
                model_id: r.get("mid"),
                tags: r.get("tags"),
                fields: r.get("flds"),
                checksum: r.get("csum"),
            })
            .collect();

        let card_rows = sqlx::query(
            "SELECT id, nid, did, ord, type, queue, due, ivl, factor, reps, lapses FROM cards",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| PackageError::Schema(format!("cannot read cards table: {}", e)))?;
        let cards: Vec<PackageCard> = card_rows
            .iter()
            .map(|r| PackageCard {
                id: r.get("id"),
                note_id: r.get("nid"),
                deck_id: r.get("did"),
                ord: r.get("ord"),
                ctype: r.get("type"),
                queue: r.get("queue"),
                due: r.get("due"),
                interval: r.get("ivl"),
                factor: r.get("factor"),
                reps: r.get("reps"),
                lapses: r.get("lapses"),
            })
            .collect();

        info!(
            "Parsed package collection: {} models, {} decks, {} notes, {} cards",
            models.len(),
            decks.len(),
            notes.len(),
            cards.len()
        );
        debug!("Collection crt epoch: {}", crt);

        Ok(PackageCollection {
            crt,
            models,
            decks,
            notes,
            cards,
        })
    }

    /// Validate the shape of a decoded model
    ///
    /// Field ordinals must be contiguous from 0; the field at ordinal
    /// 0 is the sort field, so a model with no fields is unusable.
    fn validate_model(model: &PackageModel) -> Result<(), PackageError> {
        if model.flds.is_empty() {
            return Err(PackageError::Schema(format!(
                "model {:?} has no fields",
                model.name
            )));
        }
        let mut ords: Vec<i64> = model.flds.iter().map(|f| f.ord).collect();
        ords.sort_unstable();
        for (expected, ord) in ords.iter().enumerate() {
            if *ord != expected as i64 {
                return Err(PackageError::Schema(format!(
                    "model {:?} has non-contiguous field ordinals",
                    model.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_splits_fields_on_unit_separator() {
        let note = PackageNote {
            id: 1,
            guid: "g".to_string(),
            model_id: 1,
            tags: " verbs  spanish ".to_string(),
            fields: format!("hablar{}to speak", FIELD_SEPARATOR),
            checksum: 0,
        };
        assert_eq!(note.field_values(), vec!["hablar", "to speak"]);
        assert_eq!(note.tag_values(), vec!["verbs", "spanish"]);
    }

    #[test]
    fn model_validation_rejects_gapped_ordinals() {
        let model = PackageModel {
            id: 1,
            name: "Basic".to_string(),
            kind: 0,
            flds: vec![
                PackageField {
                    name: "Front".to_string(),
                    ord: 0,
                },
                PackageField {
                    name: "Back".to_string(),
                    ord: 2,
                },
            ],
            tmpls: vec![],
            css: String::new(),
        };
        assert!(CollectionParser::validate_model(&model).is_err());
    }

    #[test]
    fn model_validation_accepts_contiguous_ordinals() {
        let model = PackageModel {
            id: 1,
            name: "Basic".to_string(),
            kind: 0,
            flds: vec![
                PackageField {
                    name: "Back".to_string(),
                    ord: 1,
                },
                PackageField {
                    name: "Front".to_string(),
                    ord: 0,
                },
            ],
            tmpls: vec![],
            css: String::new(),
        };
        assert!(CollectionParser::validate_model(&model).is_ok());
    }
}
