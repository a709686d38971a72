//! Builds package archives from scratch so import tests do not depend
//! on the crate's own export path.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use cardbox::anki::{field_checksum, strip_markup, FIELD_SEPARATOR};
use sqlx::SqlitePool;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// 2024-01-01 00:00:00 UTC; day zero for review card dues
pub const FIXTURE_CRT: i64 = 1_704_067_200;

const FIXTURE_SCHEMA: &str = r#"
CREATE TABLE col (
    id integer primary key,
    crt integer not null,
    mod integer not null,
    scm integer not null,
    ver integer not null,
    dty integer not null,
    usn integer not null,
    ls integer not null,
    conf text not null,
    models text not null,
    decks text not null,
    dconf text not null,
    tags text not null
);
CREATE TABLE notes (
    id integer primary key,
    guid text not null,
    mid integer not null,
    mod integer not null,
    usn integer not null,
    tags text not null,
    flds text not null,
    sfld text not null,
    csum integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE cards (
    id integer primary key,
    nid integer not null,
    did integer not null,
    ord integer not null,
    mod integer not null,
    usn integer not null,
    type integer not null,
    queue integer not null,
    due integer not null,
    ivl integer not null,
    factor integer not null,
    reps integer not null,
    lapses integer not null,
    left integer not null,
    odue integer not null,
    odid integer not null,
    flags integer not null,
    data text not null
);
"#;

/// One cards-table row with full scheduling control
#[derive(Debug, Clone)]
pub struct FixtureCard {
    pub id: i64,
    pub note_id: i64,
    pub deck_id: i64,
    pub ord: i64,
    pub ctype: i64,
    pub queue: i64,
    pub due: i64,
    pub interval: i64,
    pub factor: i64,
    pub reps: i64,
    pub lapses: i64,
}

impl FixtureCard {
    /// A new card at the given queue position
    pub fn fresh(id: i64, note_id: i64, deck_id: i64, position: i64) -> Self {
        FixtureCard {
            id,
            note_id,
            deck_id,
            ord: 0,
            ctype: 0,
            queue: 0,
            due: position,
            interval: 0,
            factor: 0,
            reps: 0,
            lapses: 0,
        }
    }

    /// A reviewed card due `due_days` after the collection epoch
    pub fn review(id: i64, note_id: i64, deck_id: i64, due_days: i64) -> Self {
        FixtureCard {
            id,
            note_id,
            deck_id,
            ord: 0,
            ctype: 2,
            queue: 2,
            due: due_days,
            interval: 21,
            factor: 625,
            reps: 9,
            lapses: 1,
        }
    }

    pub fn suspended(mut self) -> Self {
        self.queue = -1;
        self
    }
}

struct FixtureNote {
    id: i64,
    model_id: i64,
    fields: Vec<String>,
    tags: String,
}

/// Assembles an archive with an embedded database, metadata JSON, and
/// optional media files
pub struct PackageBuilder {
    crt: i64,
    ver: i64,
    with_metadata_row: bool,
    models: serde_json::Map<String, serde_json::Value>,
    decks: serde_json::Map<String, serde_json::Value>,
    notes: Vec<FixtureNote>,
    cards: Vec<FixtureCard>,
    media: Vec<(String, Vec<u8>)>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        PackageBuilder {
            crt: FIXTURE_CRT,
            ver: 11,
            with_metadata_row: true,
            models: serde_json::Map::new(),
            decks: serde_json::Map::new(),
            notes: Vec::new(),
            cards: Vec::new(),
            media: Vec::new(),
        }
    }
}

impl PackageBuilder {
    pub fn new() -> Self {
        PackageBuilder::default()
    }

    pub fn version(mut self, ver: i64) -> Self {
        self.ver = ver;
        self
    }

    /// Leave the col table empty, simulating a truncated archive
    pub fn without_metadata_row(mut self) -> Self {
        self.with_metadata_row = false;
        self
    }

    /// A standard two-field (Front/Back) model with one template
    pub fn basic_model(mut self, id: i64, name: &str) -> Self {
        self.models.insert(
            id.to_string(),
            serde_json::json!({
                "id": id,
                "name": name,
                "type": 0,
                "flds": [
                    {"name": "Front", "ord": 0},
                    {"name": "Back", "ord": 1},
                ],
                "tmpls": [
                    {"name": "Card 1", "ord": 0, "qfmt": "{{Front}}", "afmt": "{{Back}}"},
                ],
                "css": ".card { font-family: serif; }",
            }),
        );
        self
    }

    pub fn deck(mut self, id: i64, name: &str) -> Self {
        self.decks.insert(
            id.to_string(),
            serde_json::json!({"id": id, "name": name}),
        );
        self
    }

    pub fn note(mut self, id: i64, model_id: i64, fields: &[&str], tags: &str) -> Self {
        self.notes.push(FixtureNote {
            id,
            model_id,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            tags: tags.to_string(),
        });
        self
    }

    pub fn card(mut self, card: FixtureCard) -> Self {
        self.cards.push(card);
        self
    }

    pub fn media_file(mut self, filename: &str, bytes: &[u8]) -> Self {
        self.media.push((filename.to_string(), bytes.to_vec()));
        self
    }

    /// Write the archive to `output_path`
    pub async fn write(self, output_path: &Path) -> PathBuf {
        let staging = TempDir::new().expect("create staging dir");
        let db_path = staging.path().join("collection.anki2");

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&url).await.expect("create fixture db");
        sqlx::raw_sql(FIXTURE_SCHEMA)
            .execute(&pool)
            .await
            .expect("create fixture schema");

        if self.with_metadata_row {
            sqlx::query(
                "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
                 VALUES (1, ?, 0, 0, ?, 0, 0, 0, '{}', ?, ?, '{}', '{}')",
            )
            .bind(self.crt)
            .bind(self.ver)
            .bind(serde_json::Value::Object(self.models).to_string())
            .bind(serde_json::Value::Object(self.decks).to_string())
            .execute(&pool)
            .await
            .expect("insert col row");
        }

        let separator = FIELD_SEPARATOR.to_string();
        for note in &self.notes {
            let sort_raw = note.fields.first().cloned().unwrap_or_default();
            sqlx::query(
                "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                 VALUES (?, ?, ?, 0, -1, ?, ?, ?, ?, 0, '')",
            )
            .bind(note.id)
            .bind(format!("guid-{}", note.id))
            .bind(note.model_id)
            .bind(&note.tags)
            .bind(note.fields.join(&separator))
            .bind(strip_markup(&sort_raw))
            .bind(field_checksum(&sort_raw) as i64)
            .execute(&pool)
            .await
            .expect("insert fixture note");
        }

        for card in &self.cards {
            sqlx::query(
                "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl,
                                    factor, reps, lapses, left, odue, odid, flags, data)
                 VALUES (?, ?, ?, ?, 0, -1, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, '')",
            )
            .bind(card.id)
            .bind(card.note_id)
            .bind(card.deck_id)
            .bind(card.ord)
            .bind(card.ctype)
            .bind(card.queue)
            .bind(card.due)
            .bind(card.interval)
            .bind(card.factor)
            .bind(card.reps)
            .bind(card.lapses)
            .execute(&pool)
            .await
            .expect("insert fixture card");
        }
        pool.close().await;

        if !self.media.is_empty() {
            let mut map = serde_json::Map::new();
            for (index, (filename, bytes)) in self.media.iter().enumerate() {
                map.insert(index.to_string(), serde_json::json!(filename));
                std::fs::write(staging.path().join(index.to_string()), bytes)
                    .expect("write media payload");
            }
            std::fs::write(
                staging.path().join("media"),
                serde_json::Value::Object(map).to_string(),
            )
            .expect("write media map");
        }

        let file = File::create(output_path).expect("create fixture archive");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        let mut entries: Vec<PathBuf> = std::fs::read_dir(staging.path())
            .expect("list staging dir")
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();
        for path in entries {
            let name = path.file_name().unwrap().to_str().unwrap().to_string();
            writer.start_file(&name, options).expect("start zip entry");
            writer
                .write_all(&std::fs::read(&path).expect("read staging file"))
                .expect("write zip entry");
        }
        writer.finish().expect("finish fixture archive");

        output_path.to_path_buf()
    }
}
