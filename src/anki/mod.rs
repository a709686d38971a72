// # Anki Package Bridge
//
// Imports and exports flashcard collections as .apkg/.colpkg archives.
// A bidirectional schema translator between the internal relational
// store (uuid-keyed) and the package's embedded SQLite format
// (integer-keyed, JSON metadata, flattened deck names):
//
// - **archive**: unzip a package into a scratch dir / zip one back up
// - **collection**: decode the embedded database into typed records
// - **schema**: models <-> note types, synthetic ids on export
// - **decks**: "Parent::Child" flat names <-> parent-pointer tree
// - **scheduling**: per-card stage/due/interval/factor translation
// - **dedupe**: package-compatible checksum + duplicate policy
// - **media**: numeric-indexed flat media store <-> filename-keyed store
// - **import/export**: orchestration; one transaction per import,
//   scratch dirs removed on every path

mod archive;
mod collection;
mod decks;
mod dedupe;
mod error;
mod export;
mod import;
mod media;
mod scheduling;
mod schema;
mod types;

pub use archive::{PackageReader, PackageWriter, EMBEDDED_DB_NAMES, MEDIA_MAP_NAME};
pub use collection::{
    CollectionParser, PackageCard, PackageCollection, PackageDeck, PackageField, PackageModel,
    PackageNote, PackageTemplate, FIELD_SEPARATOR,
};
pub use decks::DeckHierarchyResolver;
pub use dedupe::{field_checksum, strip_markup, DuplicateAction, DuplicateResolver};
pub use error::PackageError;
pub use export::Exporter;
pub use import::Importer;
pub use media::{MediaTransferOutcome, MediaTransferer};
pub use scheduling::{InternalScheduling, PackageScheduling, SchedulingTranslator};
pub use schema::{IdAllocator, SchemaMapper};
pub use types::{DuplicatePolicy, ExportOptions, IdMap, ImportOptions, ImportReport};
