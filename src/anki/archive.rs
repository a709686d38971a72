use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::anki::error::PackageError;

/// Embedded database filenames accepted on read, newest first
pub const EMBEDDED_DB_NAMES: &[&str] = &["collection.anki21", "collection.anki2"];

/// Name of the numeric-key -> filename media map inside the archive
pub const MEDIA_MAP_NAME: &str = "media";

/// Open package: the archive extracted into a freshly created scratch
/// directory
///
/// The scratch directory is exclusive to one operation and removed
/// when the reader is dropped, on success and failure alike.
pub struct PackageReader {
    scratch: TempDir,
    db_path: PathBuf,
}

impl PackageReader {
    /// Validate and extract an archive
    ///
    /// Fails with `Archive` if the file does not exist, cannot be read
    /// as a zip, or contains no embedded database file. All of this
    /// happens before any database write.
    pub fn open(path: &Path, scratch_root: Option<&Path>) -> Result<Self, PackageError> {
        if !path.exists() {
            return Err(PackageError::Archive(format!(
                "package file not found: {}",
                path.display()
            )));
        }

        let scratch = match scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                TempDir::new_in(root)?
            }
            None => TempDir::new()?,
        };

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| PackageError::Archive(format!("failed to read zip archive: {}", e)))?;
        archive
            .extract(scratch.path())
            .map_err(|e| PackageError::Archive(format!("failed to extract zip: {}", e)))?;

        let db_path = EMBEDDED_DB_NAMES
            .iter()
            .map(|name| scratch.path().join(name))
            .find(|p| p.exists())
            .ok_or_else(|| {
                PackageError::Archive(format!(
                    "archive contains no embedded database ({})",
                    EMBEDDED_DB_NAMES.join(" or ")
                ))
            })?;

        info!(
            "Extracted package {} to scratch {}",
            path.display(),
            scratch.path().display()
        );

        Ok(PackageReader { scratch, db_path })
    }

    /// Path of the embedded database inside the scratch directory
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The scratch directory holding the extracted archive contents
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// Zips a populated scratch directory into a package archive
pub struct PackageWriter;

impl PackageWriter {
    /// Zip the database file, the media map, and all media payload
    /// files from `scratch_dir` into `output_path`, creating parent
    /// directories as needed
    pub fn write(scratch_dir: &Path, output_path: &Path) -> Result<PathBuf, PackageError> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(output_path)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        let mut entries: Vec<PathBuf> = std::fs::read_dir(scratch_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        // Stable archive layout regardless of directory iteration order
        entries.sort();

        for path in entries {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    PackageError::Archive(format!("non-UTF-8 filename in scratch: {}", path.display()))
                })?
                .to_string();
            writer
                .start_file(&name, options)
                .map_err(|e| PackageError::Archive(format!("failed to add {}: {}", name, e)))?;
            let bytes = std::fs::read(&path)?;
            writer.write_all(&bytes)?;
            debug!("Added {} ({} bytes) to package", name, bytes.len());
        }

        writer
            .finish()
            .map_err(|e| PackageError::Archive(format!("failed to finish archive: {}", e)))?;

        info!("Wrote package {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}
