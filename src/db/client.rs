use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::db::models::*;

/// Transaction over the internal store, scoped to one import
pub type StoreTx = Transaction<'static, Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Initialize database connection and create tables
    pub async fn new(database_path: &str) -> Result<Self, sqlx::Error> {
        // Use sqlite:// with ?mode=rwc to create if it doesn't exist
        let database_url = format!("sqlite://{}?mode=rwc", database_path);
        info!("Connecting to {}", database_url);
        let pool = SqlitePool::connect(&database_url).await?;

        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// In-memory database for tests
    ///
    /// Pinned to a single connection: every `:memory:` connection is
    /// its own database, so a pool of them would not share tables.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// Begin a transaction; all import writes happen inside exactly one
    pub async fn begin(&self) -> Result<StoreTx, sqlx::Error> {
        self.pool.begin().await
    }

    /// Create all necessary tables
    async fn create_tables(&self) -> Result<(), sqlx::Error> {
        // Note types (models)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS note_types (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                css TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Field definitions, ordinals contiguous from 0 per note type
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS note_type_fields (
                id TEXT PRIMARY KEY,
                note_type_id TEXT NOT NULL,
                ord INTEGER NOT NULL,
                name TEXT NOT NULL,
                required BOOLEAN NOT NULL DEFAULT FALSE,
                is_unique BOOLEAN NOT NULL DEFAULT FALSE,
                FOREIGN KEY (note_type_id) REFERENCES note_types (id) ON DELETE CASCADE,
                UNIQUE(note_type_id, ord)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Card templates, 1:1 with card ordinals
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS note_type_templates (
                id TEXT PRIMARY KEY,
                note_type_id TEXT NOT NULL,
                ord INTEGER NOT NULL,
                name TEXT NOT NULL,
                question_format TEXT NOT NULL,
                answer_format TEXT NOT NULL,
                FOREIGN KEY (note_type_id) REFERENCES note_types (id) ON DELETE CASCADE,
                UNIQUE(note_type_id, ord)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Decks: parent-pointer tree, path (not leaf name) is the
        // uniqueness key
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                parent_id TEXT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES decks (id) ON DELETE CASCADE,
                UNIQUE(user_id, parent_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Notes: field values and tags as JSON arrays; sort_field and
        // checksum mirror the package's sfld/csum for duplicate lookup
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                note_type_id TEXT NOT NULL,
                fields TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                sort_field TEXT NOT NULL DEFAULT '',
                checksum INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (note_type_id) REFERENCES note_types (id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS ix_notes_checksum ON notes (user_id, checksum)",
        )
        .execute(&self.pool)
        .await?;

        // Cards: stage and hold are orthogonal TEXT enums
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                note_id TEXT NOT NULL,
                deck_id TEXT NOT NULL,
                template_ord INTEGER NOT NULL,
                stage TEXT NOT NULL DEFAULT 'new',
                hold TEXT NOT NULL DEFAULT 'active',
                due TEXT,
                interval_days INTEGER NOT NULL DEFAULT 0,
                difficulty REAL NOT NULL DEFAULT 1.0,
                reps INTEGER NOT NULL DEFAULT 0,
                lapses INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (note_id) REFERENCES notes (id) ON DELETE CASCADE,
                FOREIGN KEY (deck_id) REFERENCES decks (id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS ix_cards_deck ON cards (deck_id)")
            .execute(&self.pool)
            .await?;

        // Media records: payloads live on disk, keyed by filename per user
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                storage_path TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, filename)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ----- transactional writes (import path) -----

    /// Insert a note type with its fields and templates
    pub async fn insert_note_type_tx(
        tx: &mut StoreTx,
        note_type: &DbNoteType,
        fields: &[DbFieldDef],
        templates: &[DbTemplate],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO note_types (id, user_id, name, kind, css, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note_type.id)
        .bind(&note_type.user_id)
        .bind(&note_type.name)
        .bind(note_type.kind)
        .bind(&note_type.css)
        .bind(note_type.created_at.to_rfc3339())
        .bind(note_type.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;

        for field in fields {
            sqlx::query(
                r#"
                INSERT INTO note_type_fields (id, note_type_id, ord, name, required, is_unique)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&field.id)
            .bind(&field.note_type_id)
            .bind(field.ord)
            .bind(&field.name)
            .bind(field.required)
            .bind(field.is_unique)
            .execute(&mut **tx)
            .await?;
        }

        for template in templates {
            sqlx::query(
                r#"
                INSERT INTO note_type_templates (
                    id, note_type_id, ord, name, question_format, answer_format
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&template.id)
            .bind(&template.note_type_id)
            .bind(template.ord)
            .bind(&template.name)
            .bind(&template.question_format)
            .bind(&template.answer_format)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Insert a deck node
    pub async fn insert_deck_tx(tx: &mut StoreTx, deck: &DbDeck) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO decks (id, user_id, parent_id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&deck.id)
        .bind(&deck.user_id)
        .bind(&deck.parent_id)
        .bind(&deck.name)
        .bind(deck.created_at.to_rfc3339())
        .bind(deck.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Insert a note; its cards must be inserted after it
    pub async fn insert_note_tx(tx: &mut StoreTx, note: &DbNote) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO notes (
                id, user_id, note_type_id, fields, tags, sort_field, checksum,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.id)
        .bind(&note.user_id)
        .bind(&note.note_type_id)
        .bind(&note.fields)
        .bind(&note.tags)
        .bind(&note.sort_field)
        .bind(note.checksum)
        .bind(note.created_at.to_rfc3339())
        .bind(note.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Overwrite an existing note's field values (duplicate policy: update)
    pub async fn update_note_fields_tx(
        tx: &mut StoreTx,
        note_id: &str,
        fields_json: &str,
        tags_json: &str,
        sort_field: &str,
        checksum: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notes
            SET fields = ?, tags = ?, sort_field = ?, checksum = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(fields_json)
        .bind(tags_json)
        .bind(sort_field)
        .bind(checksum)
        .bind(Utc::now().to_rfc3339())
        .bind(note_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Insert a card; ordering guarantee: its note is already committed
    /// to the transaction
    pub async fn insert_card_tx(tx: &mut StoreTx, card: &DbCard) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cards (
                id, note_id, deck_id, template_ord, stage, hold, due,
                interval_days, difficulty, reps, lapses, position,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&card.id)
        .bind(&card.note_id)
        .bind(&card.deck_id)
        .bind(card.template_ord)
        .bind(card.stage)
        .bind(card.hold)
        .bind(card.due.map(|d| d.to_rfc3339()))
        .bind(card.interval_days)
        .bind(card.difficulty)
        .bind(card.reps)
        .bind(card.lapses)
        .bind(card.position)
        .bind(card.created_at.to_rfc3339())
        .bind(card.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Insert a media record
    pub async fn insert_media_record_tx(
        tx: &mut StoreTx,
        record: &DbMediaRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO media (
                id, user_id, filename, mime_type, size_bytes, storage_path, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.filename)
        .bind(&record.mime_type)
        .bind(record.size_bytes)
        .bind(&record.storage_path)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    // ----- transactional reads (must see writes of the same import) -----

    /// Find a deck by its position in the tree
    pub async fn find_deck_tx(
        tx: &mut StoreTx,
        user_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<DbDeck>, sqlx::Error> {
        let row = match parent_id {
            Some(parent) => {
                sqlx::query(
                    "SELECT * FROM decks WHERE user_id = ? AND parent_id = ? AND name = ?",
                )
                .bind(user_id)
                .bind(parent)
                .bind(name)
                .fetch_optional(&mut **tx)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM decks WHERE user_id = ? AND parent_id IS NULL AND name = ?",
                )
                .bind(user_id)
                .bind(name)
                .fetch_optional(&mut **tx)
                .await?
            }
        };
        Ok(row.map(|r| Self::deck_from_row(&r)))
    }

    /// Find a note matching a duplicate checksum for a note type
    pub async fn find_note_by_checksum_tx(
        tx: &mut StoreTx,
        user_id: &str,
        note_type_id: &str,
        checksum: i64,
    ) -> Result<Option<DbNote>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT * FROM notes
            WHERE user_id = ? AND note_type_id = ? AND checksum = ?
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(note_type_id)
        .bind(checksum)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|r| Self::note_from_row(&r)))
    }

    /// Find a note type by name for a user
    pub async fn find_note_type_by_name_tx(
        tx: &mut StoreTx,
        user_id: &str,
        name: &str,
    ) -> Result<Option<DbNoteType>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM note_types WHERE user_id = ? AND name = ?")
            .bind(user_id)
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|r| Self::note_type_from_row(&r)))
    }

    /// Check whether a media filename is already recorded for a user
    pub async fn find_media_by_filename_tx(
        tx: &mut StoreTx,
        user_id: &str,
        filename: &str,
    ) -> Result<Option<DbMediaRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM media WHERE user_id = ? AND filename = ?")
            .bind(user_id)
            .bind(filename)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|r| Self::media_from_row(&r)))
    }

    // ----- pool reads (export path and queries) -----

    /// Get a note type by id
    pub async fn get_note_type(&self, id: &str) -> Result<Option<DbNoteType>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM note_types WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::note_type_from_row(&r)))
    }

    /// Get field definitions for a note type, ordered by ordinal
    pub async fn get_fields_for_note_type(
        &self,
        note_type_id: &str,
    ) -> Result<Vec<DbFieldDef>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM note_type_fields WHERE note_type_id = ? ORDER BY ord",
        )
        .bind(note_type_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| DbFieldDef {
                id: r.get("id"),
                note_type_id: r.get("note_type_id"),
                ord: r.get("ord"),
                name: r.get("name"),
                required: r.get("required"),
                is_unique: r.get("is_unique"),
            })
            .collect())
    }

    /// Get templates for a note type, ordered by ordinal
    pub async fn get_templates_for_note_type(
        &self,
        note_type_id: &str,
    ) -> Result<Vec<DbTemplate>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM note_type_templates WHERE note_type_id = ? ORDER BY ord",
        )
        .bind(note_type_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| DbTemplate {
                id: r.get("id"),
                note_type_id: r.get("note_type_id"),
                ord: r.get("ord"),
                name: r.get("name"),
                question_format: r.get("question_format"),
                answer_format: r.get("answer_format"),
            })
            .collect())
    }

    /// Get a deck by id
    pub async fn get_deck(&self, id: &str) -> Result<Option<DbDeck>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM decks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::deck_from_row(&r)))
    }

    /// Get all decks for a user
    pub async fn get_decks_for_user(&self, user_id: &str) -> Result<Vec<DbDeck>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM decks WHERE user_id = ? ORDER BY name")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::deck_from_row).collect())
    }

    /// Get direct children of a deck
    pub async fn get_child_decks(&self, deck_id: &str) -> Result<Vec<DbDeck>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM decks WHERE parent_id = ? ORDER BY name")
            .bind(deck_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::deck_from_row).collect())
    }

    /// Get all cards in a deck, ordered by creation time
    pub async fn get_cards_in_deck(&self, deck_id: &str) -> Result<Vec<DbCard>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM cards WHERE deck_id = ? ORDER BY created_at, id")
            .bind(deck_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::card_from_row).collect())
    }

    /// Get cards for a note, ordered by template ordinal
    pub async fn get_cards_for_note(&self, note_id: &str) -> Result<Vec<DbCard>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM cards WHERE note_id = ? ORDER BY template_ord")
            .bind(note_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::card_from_row).collect())
    }

    /// Get a note by id
    pub async fn get_note(&self, id: &str) -> Result<Option<DbNote>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::note_from_row(&r)))
    }

    /// Count notes for a user (test and reporting helper)
    pub async fn count_notes_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM notes WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Get all media records for a user, sorted by filename for stable
    /// export ordering
    pub async fn get_media_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<DbMediaRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM media WHERE user_id = ? ORDER BY filename")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::media_from_row).collect())
    }

    // ----- row decoding -----

    fn parse_utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("invalid RFC 3339 timestamp in database")
            .with_timezone(&Utc)
    }

    fn note_type_from_row(row: &sqlx::sqlite::SqliteRow) -> DbNoteType {
        DbNoteType {
            id: row.get("id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
            kind: row.get("kind"),
            css: row.get("css"),
            created_at: Self::parse_utc(&row.get::<String, _>("created_at")),
            updated_at: Self::parse_utc(&row.get::<String, _>("updated_at")),
        }
    }

    fn deck_from_row(row: &sqlx::sqlite::SqliteRow) -> DbDeck {
        DbDeck {
            id: row.get("id"),
            user_id: row.get("user_id"),
            parent_id: row.get("parent_id"),
            name: row.get("name"),
            created_at: Self::parse_utc(&row.get::<String, _>("created_at")),
            updated_at: Self::parse_utc(&row.get::<String, _>("updated_at")),
        }
    }

    fn note_from_row(row: &sqlx::sqlite::SqliteRow) -> DbNote {
        DbNote {
            id: row.get("id"),
            user_id: row.get("user_id"),
            note_type_id: row.get("note_type_id"),
            fields: row.get("fields"),
            tags: row.get("tags"),
            sort_field: row.get("sort_field"),
            checksum: row.get("checksum"),
            created_at: Self::parse_utc(&row.get::<String, _>("created_at")),
            updated_at: Self::parse_utc(&row.get::<String, _>("updated_at")),
        }
    }

    fn card_from_row(row: &sqlx::sqlite::SqliteRow) -> DbCard {
        DbCard {
            id: row.get("id"),
            note_id: row.get("note_id"),
            deck_id: row.get("deck_id"),
            template_ord: row.get("template_ord"),
            stage: row.get("stage"),
            hold: row.get("hold"),
            due: row
                .get::<Option<String>, _>("due")
                .map(|d| Self::parse_utc(&d)),
            interval_days: row.get("interval_days"),
            difficulty: row.get("difficulty"),
            reps: row.get("reps"),
            lapses: row.get("lapses"),
            position: row.get("position"),
            created_at: Self::parse_utc(&row.get::<String, _>("created_at")),
            updated_at: Self::parse_utc(&row.get::<String, _>("updated_at")),
        }
    }

    fn media_from_row(row: &sqlx::sqlite::SqliteRow) -> DbMediaRecord {
        DbMediaRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            filename: row.get("filename"),
            mime_type: row.get("mime_type"),
            size_bytes: row.get("size_bytes"),
            storage_path: row.get("storage_path"),
            created_at: Self::parse_utc(&row.get::<String, _>("created_at")),
        }
    }
}
