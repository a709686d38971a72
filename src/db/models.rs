use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

// String constants for SQL DEFAULT clauses (keep in sync with as_str())
const STAGE_NEW: &str = "new";
const STAGE_LEARNING: &str = "learning";
const STAGE_REVIEW: &str = "review";
const STAGE_RELEARNING: &str = "relearning";
const HOLD_ACTIVE: &str = "active";
const HOLD_SUSPENDED: &str = "suspended";
const HOLD_BURIED: &str = "buried";

/// Database models for the cardbox storage system
///
/// - Note types (models) define fields and card templates
/// - Notes hold field values and generate cards via templates
/// - Decks form a parent-pointer tree per user
/// - Media payloads live on disk, keyed by filename per user
///
/// Scheduling phase of a card
///
/// The package format folds suspension into the same integer it uses
/// for the scheduling stage. Internally these are two orthogonal
/// values: `Stage` is the phase, `Hold` is the suspension status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Stage {
    New,        // Never answered; due is a queue position, not a date
    Learning,   // In the initial learning steps
    Review,     // Graduated; due is a calendar day
    Relearning, // Lapsed review card repeating the learning steps
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::New => STAGE_NEW,
            Stage::Learning => STAGE_LEARNING,
            Stage::Review => STAGE_REVIEW,
            Stage::Relearning => STAGE_RELEARNING,
        }
    }
}

/// Suspension / bury status of a card, independent of its stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Hold {
    Active,
    Suspended,
    Buried,
}

impl Hold {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hold::Active => HOLD_ACTIVE,
            Hold::Suspended => HOLD_SUSPENDED,
            Hold::Buried => HOLD_BURIED,
        }
    }
}

/// Kind of a note type: standard front/back or cloze deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum NoteTypeKind {
    Standard,
    Cloze,
}

/// Note type (model) - the schema for a family of notes
///
/// Defines the ordered fields a note carries and the card templates
/// derived from them. Fields and templates are stored in their own
/// tables (`note_type_fields`, `note_type_templates`) ordered by
/// ordinal; the field at ordinal 0 is the sort field used for
/// duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbNoteType {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: NoteTypeKind,
    /// Style sheet shared by all templates of this note type
    pub css: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single field definition within a note type
///
/// Ordinals are contiguous from 0. The field at ordinal 0 is flagged
/// required and unique: its value drives duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbFieldDef {
    pub id: String,
    pub note_type_id: String,
    pub ord: i32,
    pub name: String,
    pub required: bool,
    pub is_unique: bool,
}

/// A card template within a note type
///
/// Front/back format strings reference field placeholders. Templates
/// are 1:1 with the card ordinal: a note produces one card per
/// template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbTemplate {
    pub id: String,
    pub note_type_id: String,
    pub ord: i32,
    pub name: String,
    pub question_format: String,
    pub answer_format: String,
}

/// Deck - one node of the per-user deck tree
///
/// Decks form a parent-pointer tree: `parent_id` is `None` for roots.
/// A deck name is a single path segment; the hierarchical path (not
/// the leaf name) is the uniqueness key, enforced as
/// UNIQUE(user_id, parent_id, name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbDeck {
    pub id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Note - one piece of content (a set of field values)
///
/// Field values are stored as a JSON array ordered by field ordinal;
/// tags as a JSON array of strings. `sort_field` mirrors the value at
/// ordinal 0 and `checksum` is its package-compatible 32-bit hash, so
/// duplicate lookup is a single indexed query. A note has no deck of
/// its own; its owning deck derives from its first card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbNote {
    pub id: String,
    pub user_id: String,
    pub note_type_id: String,
    /// Field values ordered by ordinal, serialized as a JSON array
    pub fields: String,
    /// Tag set serialized as a JSON array
    pub tags: String,
    /// Stripped value of the field at ordinal 0
    pub sort_field: String,
    /// High 32 bits of the sort field's SHA-1, unsigned
    pub checksum: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Card - one reviewable unit derived from a note and a template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbCard {
    pub id: String,
    pub note_id: String,
    pub deck_id: String,
    /// Which of the note type's templates generated this card
    pub template_ord: i32,
    pub stage: Stage,
    pub hold: Hold,
    /// Absolute due time; `None` for new cards (they queue by position)
    pub due: Option<DateTime<Utc>>,
    pub interval_days: i64,
    /// Ease as a difficulty value; the package encodes it as
    /// round(((difficulty - 1) / 4) * 1000)
    pub difficulty: f64,
    pub reps: i64,
    pub lapses: i64,
    /// Queue position for new cards, monotonically increasing
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Media payload metadata
///
/// Payloads live on disk under the user's media directory, keyed by
/// their real filename (fields reference media by filename in their
/// HTML). Deduplication is by filename only, never by content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbMediaRecord {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

impl DbNoteType {
    pub fn new(user_id: &str, name: &str, kind: NoteTypeKind, css: &str) -> Self {
        let now = Utc::now();
        DbNoteType {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            kind,
            css: css.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl DbFieldDef {
    pub fn new(note_type_id: &str, ord: i32, name: &str) -> Self {
        DbFieldDef {
            id: Uuid::new_v4().to_string(),
            note_type_id: note_type_id.to_string(),
            ord,
            name: name.to_string(),
            // Ordinal 0 is the sort field
            required: ord == 0,
            is_unique: ord == 0,
        }
    }
}

impl DbTemplate {
    pub fn new(
        note_type_id: &str,
        ord: i32,
        name: &str,
        question_format: &str,
        answer_format: &str,
    ) -> Self {
        DbTemplate {
            id: Uuid::new_v4().to_string(),
            note_type_id: note_type_id.to_string(),
            ord,
            name: name.to_string(),
            question_format: question_format.to_string(),
            answer_format: answer_format.to_string(),
        }
    }
}

impl DbDeck {
    pub fn new(user_id: &str, parent_id: Option<&str>, name: &str) -> Self {
        let now = Utc::now();
        DbDeck {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            parent_id: parent_id.map(|p| p.to_string()),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl DbNote {
    /// Create a note from ordered field values and tags
    ///
    /// `sort_field` and `checksum` must already be computed from the
    /// value at ordinal 0 (see `anki::dedupe`).
    pub fn new(
        user_id: &str,
        note_type_id: &str,
        fields: &[String],
        tags: &[String],
        sort_field: &str,
        checksum: u32,
    ) -> Result<Self, serde_json::Error> {
        let now = Utc::now();
        Ok(DbNote {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            note_type_id: note_type_id.to_string(),
            fields: serde_json::to_string(fields)?,
            tags: serde_json::to_string(tags)?,
            sort_field: sort_field.to_string(),
            checksum: checksum as i64,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn field_values(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.fields)
    }

    pub fn tag_values(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.tags)
    }
}

impl DbCard {
    /// Create a fresh new card (stage New, no scheduling history)
    pub fn new_card(note_id: &str, deck_id: &str, template_ord: i32, position: i64) -> Self {
        let now = Utc::now();
        DbCard {
            id: Uuid::new_v4().to_string(),
            note_id: note_id.to_string(),
            deck_id: deck_id.to_string(),
            template_ord,
            stage: Stage::New,
            hold: Hold::Active,
            due: None,
            interval_days: 0,
            difficulty: 1.0,
            reps: 0,
            lapses: 0,
            position,
            created_at: now,
            updated_at: now,
        }
    }
}

impl DbMediaRecord {
    pub fn new(
        user_id: &str,
        filename: &str,
        mime_type: &str,
        size_bytes: i64,
        storage_path: &str,
    ) -> Self {
        DbMediaRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            storage_path: storage_path.to_string(),
            created_at: Utc::now(),
        }
    }
}
