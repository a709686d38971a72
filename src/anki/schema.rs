use chrono::Utc;

use crate::anki::collection::{PackageField, PackageModel, PackageTemplate};
use crate::anki::error::PackageError;
use crate::db::{DbFieldDef, DbNoteType, DbTemplate, NoteTypeKind};

// Package model type discriminators
const MODEL_KIND_STANDARD: i64 = 0;
const MODEL_KIND_CLOZE: i64 = 1;

/// Allocates synthetic package-style integer ids on export
///
/// Seeded from the current time in milliseconds, scaled so the values
/// cannot collide with any real timestamp-derived id elsewhere in the
/// same generated collection. Models, decks, notes, and cards each
/// draw from a logically separate counter because the package format
/// does not share an id namespace across tables.
#[derive(Debug)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    const TABLE_STRIDE: i64 = 10_000_000;

    /// Allocator for table slot `slot` (0 = models, 1 = decks,
    /// 2 = notes, 3 = cards), all derived from one seed
    pub fn for_table(seed_millis: i64, slot: i64) -> Self {
        IdAllocator {
            next: seed_millis * 1000 + slot * Self::TABLE_STRIDE,
        }
    }

    /// Seed shared by all of one operation's allocators
    pub fn seed_now() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Next synthetic id, monotonically increasing
    pub fn alloc(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Bidirectional translation of models (note types), fields, and
/// templates between the package and internal representations
pub struct SchemaMapper;

impl SchemaMapper {
    /// Package model -> internal note type with fields and templates
    ///
    /// Fields are sorted by ordinal; ordinal 0 becomes the required,
    /// unique sort field. Templates map question/answer format strings
    /// 1:1 by ordinal.
    pub fn to_internal(
        user_id: &str,
        model: &PackageModel,
    ) -> Result<(DbNoteType, Vec<DbFieldDef>, Vec<DbTemplate>), PackageError> {
        let kind = match model.kind {
            MODEL_KIND_STANDARD => NoteTypeKind::Standard,
            MODEL_KIND_CLOZE => NoteTypeKind::Cloze,
            other => {
                return Err(PackageError::Schema(format!(
                    "model {:?} has unknown type discriminator {}",
                    model.name, other
                )))
            }
        };

        let note_type = DbNoteType::new(user_id, &model.name, kind, &model.css);

        let mut package_fields: Vec<&PackageField> = model.flds.iter().collect();
        package_fields.sort_by_key(|f| f.ord);
        let fields: Vec<DbFieldDef> = package_fields
            .iter()
            .map(|f| DbFieldDef::new(&note_type.id, f.ord as i32, &f.name))
            .collect();

        let mut package_templates: Vec<&PackageTemplate> = model.tmpls.iter().collect();
        package_templates.sort_by_key(|t| t.ord);
        let templates: Vec<DbTemplate> = package_templates
            .iter()
            .map(|t| DbTemplate::new(&note_type.id, t.ord as i32, &t.name, &t.qfmt, &t.afmt))
            .collect();

        Ok((note_type, fields, templates))
    }

    /// Internal note type -> package model under a synthetic id
    pub fn to_package(
        note_type: &DbNoteType,
        fields: &[DbFieldDef],
        templates: &[DbTemplate],
        package_id: i64,
    ) -> PackageModel {
        PackageModel {
            id: package_id,
            name: note_type.name.clone(),
            kind: match note_type.kind {
                NoteTypeKind::Standard => MODEL_KIND_STANDARD,
                NoteTypeKind::Cloze => MODEL_KIND_CLOZE,
            },
            flds: fields
                .iter()
                .map(|f| PackageField {
                    name: f.name.clone(),
                    ord: f.ord as i64,
                })
                .collect(),
            tmpls: templates
                .iter()
                .map(|t| PackageTemplate {
                    name: t.name.clone(),
                    ord: t.ord as i64,
                    qfmt: t.question_format.clone(),
                    afmt: t.answer_format.clone(),
                })
                .collect(),
            css: note_type.css.clone(),
        }
    }
}
