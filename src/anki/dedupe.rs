use std::sync::OnceLock;

use regex::Regex;
use sha1::{Digest, Sha1};

use crate::anki::types::DuplicatePolicy;
use crate::db::DbNote;

fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("markup regex"))
}

/// Strip markup from a field value, leaving only visible text
///
/// Tags are removed, common entities decoded, whitespace trimmed.
/// Markup that does not change visible text must not change the
/// checksum: `<b>Hello</b>` and `Hello` strip identically.
pub fn strip_markup(value: &str) -> String {
    let stripped = markup_re().replace_all(value, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Package-compatible checksum of a note's sort field
///
/// SHA-1 of the stripped text, high 32 bits as an unsigned integer.
/// This must match the package format's own checksum bit-for-bit:
/// collections are cross-importable only because both sides agree on
/// this value. Not a tunable.
pub fn field_checksum(sort_field_value: &str) -> u32 {
    let text = strip_markup(sort_field_value);
    let digest = Sha1::digest(text.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// What the importer should do with one incoming note
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateAction {
    /// No match, or policy ImportAsNew: insert a new note
    InsertNew,
    /// Policy Skip: keep the existing note untouched; its cards are
    /// not imported
    SkipExisting(String),
    /// Policy Update: overwrite the existing note's field values
    UpdateExisting(String),
}

/// Applies the configured duplicate policy and counts skips
#[derive(Debug, Default)]
pub struct DuplicateResolver {
    policy: DuplicatePolicy,
    skipped: u32,
}

impl DuplicateResolver {
    pub fn new(policy: DuplicatePolicy) -> Self {
        DuplicateResolver { policy, skipped: 0 }
    }

    /// Decide what to do with a note given an existing checksum match
    pub fn resolve(&mut self, existing_match: Option<&DbNote>) -> DuplicateAction {
        match (self.policy, existing_match) {
            // import_as_new always inserts regardless of any match
            (DuplicatePolicy::ImportAsNew, _) => DuplicateAction::InsertNew,
            (_, None) => DuplicateAction::InsertNew,
            (DuplicatePolicy::Skip, Some(existing)) => {
                self.skipped += 1;
                DuplicateAction::SkipExisting(existing.id.clone())
            }
            (DuplicatePolicy::Update, Some(existing)) => {
                DuplicateAction::UpdateExisting(existing.id.clone())
            }
        }
    }

    /// Notes skipped so far in this operation
    pub fn skipped(&self) -> u32 {
        self.skipped
    }
}
