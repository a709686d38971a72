// Library exports for integration tests and reusable components

pub mod anki;
pub mod config;
pub mod db;
pub mod library;

pub use config::BridgeConfig;
pub use library::{LibraryError, LibraryManager};
