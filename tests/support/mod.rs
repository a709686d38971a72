#![allow(dead_code)]

pub mod package_builder;

pub use package_builder::{FixtureCard, PackageBuilder, FIXTURE_CRT};

use cardbox::db::Database;
use cardbox::{BridgeConfig, LibraryManager};
use tempfile::TempDir;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A library over a fresh in-memory store, with media and scratch
/// directories rooted under `root`
pub async fn test_library(root: &TempDir) -> LibraryManager {
    let database = Database::new_in_memory()
        .await
        .expect("create in-memory database");
    let config = BridgeConfig {
        media_dir: root.path().join("media"),
        scratch_root: Some(root.path().join("scratch")),
    };
    LibraryManager::new(database, config)
}
