use std::collections::HashMap;

use tracing::debug;

use crate::anki::error::PackageError;
use crate::db::client::StoreTx;
use crate::db::{Database, DbDeck};

/// Hierarchy separator used by the package's flattened deck names
pub const SEPARATOR: &str = "::";

/// Translates the package's flat `"Parent::Child"` deck names into and
/// out of the internal parent-pointer tree
///
/// Operation-scoped: the resolved-path cache lives exactly as long as
/// one import call.
#[derive(Debug, Default)]
pub struct DeckHierarchyResolver {
    /// Full path -> internal deck id, so repeated resolution of an
    /// identical path never creates duplicates
    resolved: HashMap<Vec<String>, String>,
}

impl DeckHierarchyResolver {
    pub fn new() -> Self {
        DeckHierarchyResolver::default()
    }

    /// Split a flat deck name into ordered path segments
    ///
    /// Every `::` is a separator; a leaf name containing a literal
    /// `::` is indistinguishable from hierarchy in the package format,
    /// so it always splits.
    pub fn decode(name: &str) -> Vec<String> {
        name.split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    /// Join path segments into a flat package deck name
    ///
    /// Strict inverse of `decode` only for segments free of the
    /// separator; a segment containing `::` cannot be represented and
    /// is rejected.
    pub fn encode(path: &[String]) -> Result<String, PackageError> {
        for segment in path {
            if segment.contains(SEPARATOR) {
                return Err(PackageError::DeckName(segment.clone()));
            }
        }
        Ok(path.join(SEPARATOR))
    }

    /// Walk the path, looking up or creating each ancestor deck inside
    /// the active transaction, and return the leaf deck id
    ///
    /// Idempotent: repeated calls for an identical path return the
    /// same leaf id and create nothing new.
    pub async fn resolve_or_create(
        &mut self,
        tx: &mut StoreTx,
        user_id: &str,
        segments: &[String],
    ) -> Result<String, PackageError> {
        if segments.is_empty() {
            return Err(PackageError::RowMapping(
                "deck name resolves to an empty path".to_string(),
            ));
        }

        if let Some(id) = self.resolved.get(segments) {
            return Ok(id.clone());
        }

        let mut parent_id: Option<String> = None;
        let mut walked: Vec<String> = Vec::with_capacity(segments.len());

        for segment in segments {
            walked.push(segment.clone());

            if let Some(id) = self.resolved.get(&walked) {
                parent_id = Some(id.clone());
                continue;
            }

            let existing =
                Database::find_deck_tx(tx, user_id, parent_id.as_deref(), segment).await?;
            let deck_id = match existing {
                Some(deck) => deck.id,
                None => {
                    let deck = DbDeck::new(user_id, parent_id.as_deref(), segment);
                    debug!("Creating deck {:?} (path {:?})", segment, walked);
                    Database::insert_deck_tx(tx, &deck).await?;
                    deck.id
                }
            };

            self.resolved.insert(walked.clone(), deck_id.clone());
            parent_id = Some(deck_id);
        }

        // Loop ran at least once, so parent_id is the leaf
        Ok(parent_id.expect("non-empty path yields a leaf deck"))
    }

    /// Full path of an internal deck, root first, by walking parent
    /// pointers
    pub async fn path_of(db: &Database, deck: &DbDeck) -> Result<Vec<String>, PackageError> {
        let mut path = vec![deck.name.clone()];
        let mut current = deck.parent_id.clone();
        while let Some(parent_id) = current {
            let parent = db.get_deck(&parent_id).await?.ok_or_else(|| {
                PackageError::RowMapping(format!("deck parent {} does not exist", parent_id))
            })?;
            path.push(parent.name.clone());
            current = parent.parent_id;
        }
        path.reverse();
        Ok(path)
    }
}
