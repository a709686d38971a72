use std::path::PathBuf;

/// Configuration for the package bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Directory where imported media payloads are stored, one
    /// subdirectory per user, files keyed by their real filename
    pub media_dir: PathBuf,
    /// Root for per-operation scratch directories. `None` uses the
    /// system temp directory. Every operation gets a freshly created,
    /// randomly named scratch dir that is never reused.
    pub scratch_root: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir().expect("Failed to get home directory");
        BridgeConfig {
            media_dir: home_dir.join(".cardbox").join("media"),
            scratch_root: None,
        }
    }
}

impl BridgeConfig {
    /// Media directory for a single user
    pub fn user_media_dir(&self, user_id: &str) -> PathBuf {
        self.media_dir.join(user_id)
    }
}
