use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::anki::archive::MEDIA_MAP_NAME;
use crate::anki::error::PackageError;
use crate::db::client::StoreTx;
use crate::db::{Database, DbMediaRecord};

/// Extension allow-list for imported media, with their MIME types
const ALLOWED_EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    ("m4a", "audio/mp4"),
    ("flac", "audio/flac"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
];

fn mime_for(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Result of one media transfer pass
#[derive(Debug, Default)]
pub struct MediaTransferOutcome {
    pub transferred: u32,
    /// Non-fatal per-file messages; the operation continues past them
    pub warnings: Vec<String>,
}

/// Moves files between the package's numeric-indexed flat media store
/// and the internal filename-keyed media store
pub struct MediaTransferer;

impl MediaTransferer {
    /// Import media payloads from an extracted package
    ///
    /// Reads the numeric -> filename map, copies each payload into the
    /// user's media directory under its real filename, and records a
    /// media row inside the active transaction. A missing or
    /// unreadable individual file is skipped with a warning; it never
    /// fails the import.
    pub async fn import(
        tx: &mut StoreTx,
        user_id: &str,
        scratch_dir: &Path,
        media_dir: &Path,
    ) -> Result<MediaTransferOutcome, PackageError> {
        let mut outcome = MediaTransferOutcome::default();

        let map_path = scratch_dir.join(MEDIA_MAP_NAME);
        if !map_path.exists() {
            debug!("Package has no media map; nothing to import");
            return Ok(outcome);
        }

        let raw = tokio::fs::read_to_string(&map_path).await?;
        let name_map: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| PackageError::Schema(format!("malformed media map: {}", e)))?;

        // Numeric key order keeps the pass deterministic
        let mut entries: Vec<(&String, &String)> = name_map.iter().collect();
        entries.sort_by_key(|(key, _)| key.parse::<u64>().unwrap_or(u64::MAX));

        tokio::fs::create_dir_all(media_dir).await?;

        for (key, filename) in entries {
            match Self::import_one(tx, user_id, scratch_dir, media_dir, key, filename).await {
                Ok(true) => outcome.transferred += 1,
                Ok(false) => {}
                Err(PackageError::Media(msg)) => {
                    warn!("Skipping media file: {}", msg);
                    outcome.warnings.push(format!("Media error: {}", msg));
                }
                Err(other) => return Err(other),
            }
        }

        info!(
            "Imported {} media files ({} skipped)",
            outcome.transferred,
            outcome.warnings.len()
        );
        Ok(outcome)
    }

    /// Copy one payload; Ok(false) means a silent filename-dedup skip
    async fn import_one(
        tx: &mut StoreTx,
        user_id: &str,
        scratch_dir: &Path,
        media_dir: &Path,
        key: &str,
        filename: &str,
    ) -> Result<bool, PackageError> {
        // Untrusted archive input: never let a mapped name escape the
        // media directory
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(PackageError::Media(format!(
                "unsafe media filename {:?}",
                filename
            )));
        }

        let mime = mime_for(filename).ok_or_else(|| {
            PackageError::Media(format!("disallowed media extension: {:?}", filename))
        })?;

        let source = scratch_dir.join(key);
        let metadata = tokio::fs::metadata(&source).await.map_err(|e| {
            PackageError::Media(format!("payload {} for {:?} unreadable: {}", key, filename, e))
        })?;

        // Dedup by filename only, never by content hash
        if Database::find_media_by_filename_tx(tx, user_id, filename)
            .await?
            .is_some()
        {
            debug!("Media {:?} already present, skipping", filename);
            return Ok(false);
        }

        let dest = media_dir.join(filename);
        tokio::fs::copy(&source, &dest).await.map_err(|e| {
            PackageError::Media(format!("cannot copy {:?}: {}", filename, e))
        })?;

        let record = DbMediaRecord::new(
            user_id,
            filename,
            mime,
            metadata.len() as i64,
            &dest.to_string_lossy(),
        );
        Database::insert_media_record_tx(tx, &record).await?;

        Ok(true)
    }

    /// Export media records into a scratch directory
    ///
    /// Assigns sequential numeric names in stable (sorted-filename)
    /// iteration order, writes the payloads under those names, and
    /// writes the numeric -> filename map alongside them. A missing
    /// payload is skipped with a warning.
    pub async fn export(
        records: &[DbMediaRecord],
        scratch_dir: &Path,
    ) -> Result<MediaTransferOutcome, PackageError> {
        let mut outcome = MediaTransferOutcome::default();
        let mut name_map: HashMap<String, String> = HashMap::new();

        let mut sorted: Vec<&DbMediaRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.filename.cmp(&b.filename));

        let mut index = 0u32;
        for record in sorted {
            let dest = scratch_dir.join(index.to_string());
            match tokio::fs::copy(&record.storage_path, &dest).await {
                Ok(_) => {
                    name_map.insert(index.to_string(), record.filename.clone());
                    index += 1;
                    outcome.transferred += 1;
                }
                Err(e) => {
                    warn!("Skipping media payload {:?}: {}", record.filename, e);
                    outcome
                        .warnings
                        .push(format!("Media error: payload {:?} unreadable: {}", record.filename, e));
                }
            }
        }

        let map_json = serde_json::to_string(&name_map)?;
        tokio::fs::write(scratch_dir.join(MEDIA_MAP_NAME), map_json).await?;

        info!("Exported {} media files", outcome.transferred);
        Ok(outcome)
    }
}
