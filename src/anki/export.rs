// # Package Export
//
// Reads the internal store and synthesizes a package: an embedded
// SQLite database with JSON-encoded models/decks metadata, the media
// map and payloads, zipped into the output archive. Export only reads
// the durable entities; all package-side ids are synthetic and
// operation-scoped.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::anki::archive::{PackageWriter, MEDIA_MAP_NAME};
use crate::anki::collection::{PackageDeck, COLLECTION_VERSION, FIELD_SEPARATOR};
use crate::anki::decks::DeckHierarchyResolver;
use crate::anki::dedupe::{field_checksum, strip_markup};
use crate::anki::error::PackageError;
use crate::anki::media::MediaTransferer;
use crate::anki::scheduling::SchedulingTranslator;
use crate::anki::schema::{IdAllocator, SchemaMapper};
use crate::anki::types::ExportOptions;
use crate::config::BridgeConfig;
use crate::db::{Database, DbCard, DbDeck, DbNote};

/// Embedded database filename written on export
const EMBEDDED_DB_NAME: &str = "collection.anki2";

/// Classic package schema: col metadata row, notes, cards, plus the
/// read-through revlog and graves tables (written empty)
const PACKAGE_SCHEMA: &str = r#"
CREATE TABLE col (
    id              integer primary key,
    crt             integer not null,
    mod             integer not null,
    scm             integer not null,
    ver             integer not null,
    dty             integer not null,
    usn             integer not null,
    ls              integer not null,
    conf            text not null,
    models          text not null,
    decks           text not null,
    dconf           text not null,
    tags            text not null
);
CREATE TABLE notes (
    id              integer primary key,
    guid            text not null,
    mid             integer not null,
    mod             integer not null,
    usn             integer not null,
    tags            text not null,
    flds            text not null,
    sfld            text not null,
    csum            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE cards (
    id              integer primary key,
    nid             integer not null,
    did             integer not null,
    ord             integer not null,
    mod             integer not null,
    usn             integer not null,
    type            integer not null,
    queue           integer not null,
    due             integer not null,
    ivl             integer not null,
    factor          integer not null,
    reps            integer not null,
    lapses          integer not null,
    left            integer not null,
    odue            integer not null,
    odid            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE revlog (
    id              integer primary key,
    cid             integer not null,
    usn             integer not null,
    ease            integer not null,
    ivl             integer not null,
    lastIvl         integer not null,
    factor          integer not null,
    time            integer not null,
    type            integer not null
);
CREATE TABLE graves (
    usn             integer not null,
    oid             integer not null,
    type            integer not null
);
CREATE INDEX ix_notes_csum on notes (csum);
CREATE INDEX ix_cards_nid on cards (nid);
"#;

/// Exports decks or whole collections as package archives
pub struct Exporter {
    database: Database,
    config: BridgeConfig,
}

impl Exporter {
    pub fn new(database: Database, config: BridgeConfig) -> Self {
        Exporter { database, config }
    }

    /// Export the named decks (plus all their descendants) for a user
    pub async fn export(
        &self,
        user_id: &str,
        deck_ids: &[String],
        output_path: &Path,
        options: &ExportOptions,
    ) -> Result<PathBuf, PackageError> {
        let mut decks = Vec::new();
        let mut seen = HashSet::new();
        for deck_id in deck_ids {
            let deck = self.database.get_deck(deck_id).await?.ok_or_else(|| {
                PackageError::RowMapping(format!("deck {} does not exist", deck_id))
            })?;
            self.collect_subtree(deck, &mut decks, &mut seen).await?;
        }
        self.write_package(user_id, decks, output_path, options).await
    }

    /// Export a user's entire collection as a full backup (.colpkg)
    pub async fn export_collection(
        &self,
        user_id: &str,
        output_path: &Path,
    ) -> Result<PathBuf, PackageError> {
        let decks = self.database.get_decks_for_user(user_id).await?;
        let options = ExportOptions {
            include_scheduling: true,
            include_media: true,
            include_tags: true,
        };
        self.write_package(user_id, decks, output_path, &options).await
    }

    /// Depth-first collection of a deck and its descendants
    async fn collect_subtree(
        &self,
        deck: DbDeck,
        out: &mut Vec<DbDeck>,
        seen: &mut HashSet<String>,
    ) -> Result<(), PackageError> {
        if !seen.insert(deck.id.clone()) {
            return Ok(());
        }
        let mut stack = vec![deck];
        while let Some(current) = stack.pop() {
            let children = self.database.get_child_decks(&current.id).await?;
            for child in children {
                if seen.insert(child.id.clone()) {
                    stack.push(child);
                }
            }
            out.push(current);
        }
        Ok(())
    }

    async fn write_package(
        &self,
        user_id: &str,
        mut decks: Vec<DbDeck>,
        output_path: &Path,
        options: &ExportOptions,
    ) -> Result<PathBuf, PackageError> {
        info!(
            "Exporting {} decks for user {} to {}",
            decks.len(),
            user_id,
            output_path.display()
        );
        decks.sort_by(|a, b| a.id.cmp(&b.id));

        // Deck names containing the separator cannot be represented in
        // the flattened package format; reject before producing files
        let mut deck_paths: HashMap<String, String> = HashMap::new();
        for deck in &decks {
            let path = DeckHierarchyResolver::path_of(&self.database, deck).await?;
            deck_paths.insert(deck.id.clone(), DeckHierarchyResolver::encode(&path)?);
        }

        // Gather cards per deck, then notes through their cards; a
        // note's owning deck is derived transitively from its first card
        let mut cards: Vec<DbCard> = Vec::new();
        for deck in &decks {
            cards.extend(self.database.get_cards_in_deck(&deck.id).await?);
        }

        let mut notes: Vec<DbNote> = Vec::new();
        let mut note_ids = HashSet::new();
        for card in &cards {
            if note_ids.insert(card.note_id.clone()) {
                let note = self.database.get_note(&card.note_id).await?.ok_or_else(|| {
                    PackageError::RowMapping(format!(
                        "card {} references note {} which does not exist",
                        card.id, card.note_id
                    ))
                })?;
                notes.push(note);
            }
        }
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        // Day-zero reference for review dues; computed exactly once
        // per operation
        let crt = Self::collection_epoch(&cards);

        // Per-table synthetic id counters from one seed
        let seed = IdAllocator::seed_now();
        let mut model_ids = IdAllocator::for_table(seed, 0);
        let mut deck_ids = IdAllocator::for_table(seed, 1);
        let mut note_ids_alloc = IdAllocator::for_table(seed, 2);
        let mut card_ids = IdAllocator::for_table(seed, 3);

        let scratch = match &self.config.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                TempDir::new_in(root)?
            }
            None => TempDir::new()?,
        };

        let db_path = scratch.path().join(EMBEDDED_DB_NAME);
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&url).await?;
        let result = self
            .fill_embedded_db(
                &pool,
                &decks,
                &deck_paths,
                &notes,
                &cards,
                crt,
                options,
                &mut model_ids,
                &mut deck_ids,
                &mut note_ids_alloc,
                &mut card_ids,
            )
            .await;
        pool.close().await;
        result?;

        // Media map and payloads alongside the database file
        if options.include_media {
            let referenced = self.referenced_media(user_id, &notes).await?;
            let outcome = MediaTransferer::export(&referenced, scratch.path()).await?;
            for warning in &outcome.warnings {
                tracing::warn!("Media export: {}", warning);
            }
        } else {
            tokio::fs::write(scratch.path().join(MEDIA_MAP_NAME), "{}").await?;
        }

        PackageWriter::write(scratch.path(), output_path)
    }

    async fn fill_embedded_db(
        &self,
        pool: &SqlitePool,
        decks: &[DbDeck],
        deck_paths: &HashMap<String, String>,
        notes: &[DbNote],
        cards: &[DbCard],
        crt: i64,
        options: &ExportOptions,
        model_ids: &mut IdAllocator,
        deck_ids: &mut IdAllocator,
        note_ids: &mut IdAllocator,
        card_ids: &mut IdAllocator,
    ) -> Result<(), PackageError> {
        sqlx::raw_sql(PACKAGE_SCHEMA).execute(pool).await?;

        // Models for every note type referenced by an exported note
        let mut model_map: HashMap<String, i64> = HashMap::new();
        let mut models_json: HashMap<String, serde_json::Value> = HashMap::new();
        for note in notes {
            if model_map.contains_key(&note.note_type_id) {
                continue;
            }
            let note_type = self
                .database
                .get_note_type(&note.note_type_id)
                .await?
                .ok_or_else(|| {
                    PackageError::RowMapping(format!(
                        "note {} references note type {} which does not exist",
                        note.id, note.note_type_id
                    ))
                })?;
            let fields = self.database.get_fields_for_note_type(&note_type.id).await?;
            let templates = self
                .database
                .get_templates_for_note_type(&note_type.id)
                .await?;
            let package_id = model_ids.alloc();
            let model = SchemaMapper::to_package(&note_type, &fields, &templates, package_id);
            models_json.insert(package_id.to_string(), serde_json::to_value(&model)?);
            model_map.insert(note.note_type_id.clone(), package_id);
            debug!("Model {:?} -> synthetic id {}", note_type.name, package_id);
        }

        // Flattened deck entries; the package format always carries a
        // Default deck with id 1
        let mut deck_map: HashMap<String, i64> = HashMap::new();
        let mut decks_json: HashMap<String, serde_json::Value> = HashMap::new();
        decks_json.insert(
            "1".to_string(),
            serde_json::to_value(PackageDeck {
                id: 1,
                name: "Default".to_string(),
            })?,
        );
        for deck in decks {
            let package_id = deck_ids.alloc();
            let name = deck_paths
                .get(&deck.id)
                .cloned()
                .unwrap_or_else(|| deck.name.clone());
            decks_json.insert(
                package_id.to_string(),
                serde_json::to_value(PackageDeck {
                    id: package_id,
                    name,
                })?,
            );
            deck_map.insert(deck.id.clone(), package_id);
        }

        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
            VALUES (1, ?, ?, ?, ?, 0, 0, 0, '{}', ?, ?, '{}', '{}')
            "#,
        )
        .bind(crt)
        .bind(now)
        .bind(now)
        .bind(COLLECTION_VERSION)
        .bind(serde_json::to_string(&models_json)?)
        .bind(serde_json::to_string(&decks_json)?)
        .execute(pool)
        .await?;

        // Notes first, then cards, mirroring import's ordering guarantee
        let separator = FIELD_SEPARATOR.to_string();
        let mut note_id_map: HashMap<String, i64> = HashMap::new();
        for note in notes {
            let package_id = note_ids.alloc();
            note_id_map.insert(note.id.clone(), package_id);

            let fields = note.field_values()?;
            let sort_raw = fields.first().cloned().unwrap_or_default();
            let tags = if options.include_tags {
                let values = note.tag_values()?;
                if values.is_empty() {
                    String::new()
                } else {
                    format!(" {} ", values.join(" "))
                }
            } else {
                String::new()
            };

            sqlx::query(
                r#"
                INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                VALUES (?, ?, ?, ?, -1, ?, ?, ?, ?, 0, '')
                "#,
            )
            .bind(package_id)
            .bind(&note.id)
            .bind(model_map.get(&note.note_type_id).copied())
            .bind(now)
            .bind(&tags)
            .bind(fields.join(&separator))
            .bind(strip_markup(&sort_raw))
            .bind(field_checksum(&sort_raw) as i64)
            .execute(pool)
            .await?;
        }

        // Fresh queue positions when scheduling is not included
        let mut fresh_position = 0i64;
        for card in cards {
            let Some(note_package_id) = note_id_map.get(&card.note_id) else {
                continue;
            };
            let deck_package_id = deck_map.get(&card.deck_id).copied().unwrap_or(1);

            let sched = if options.include_scheduling {
                SchedulingTranslator::to_package_encoding(card, crt)
            } else {
                let mut fresh = card.clone();
                fresh.stage = crate::db::Stage::New;
                fresh.hold = crate::db::Hold::Active;
                fresh.due = None;
                fresh.interval_days = 0;
                fresh.difficulty = 1.0;
                fresh.reps = 0;
                fresh.lapses = 0;
                fresh.position = fresh_position;
                fresh_position += 1;
                SchedulingTranslator::to_package_encoding(&fresh, crt)
            };

            sqlx::query(
                r#"
                INSERT INTO cards (
                    id, nid, did, ord, mod, usn, type, queue, due, ivl,
                    factor, reps, lapses, left, odue, odid, flags, data
                ) VALUES (?, ?, ?, ?, ?, -1, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, '')
                "#,
            )
            .bind(card_ids.alloc())
            .bind(note_package_id)
            .bind(deck_package_id)
            .bind(card.template_ord)
            .bind(now)
            .bind(sched.ctype)
            .bind(sched.queue)
            .bind(sched.due)
            .bind(sched.interval)
            .bind(sched.factor)
            .bind(sched.reps)
            .bind(sched.lapses)
            .execute(pool)
            .await?;
        }

        Ok(())
    }

    /// Media records whose filename appears in an exported note field
    async fn referenced_media(
        &self,
        user_id: &str,
        notes: &[DbNote],
    ) -> Result<Vec<crate::db::DbMediaRecord>, PackageError> {
        let records = self.database.get_media_for_user(user_id).await?;
        if records.is_empty() {
            return Ok(records);
        }
        let mut haystack = String::new();
        for note in notes {
            haystack.push_str(&note.fields);
        }
        Ok(records
            .into_iter()
            .filter(|r| haystack.contains(&r.filename))
            .collect())
    }

    /// Earliest exported card's creation day as epoch seconds,
    /// falling back to today
    fn collection_epoch(cards: &[DbCard]) -> i64 {
        let earliest: DateTime<Utc> = cards
            .iter()
            .map(|c| c.created_at)
            .min()
            .unwrap_or_else(Utc::now);
        earliest
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc()
            .timestamp()
    }
}
