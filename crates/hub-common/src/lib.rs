//! Centralized data-root management for the MSME Hub server
//!
//! Directory layout:
//! ```text
//! msme_data/
//! ├── local/            # SQLite database (users, sessions, businesses, records, guides)
//! ├── conversations/    # One JSON document per conversation
//! └── guides.json       # Optional GST guide seed
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data root.
pub const HUB_ROOT_ENV: &str = "MSME_HUB_ROOT";

const DEFAULT_ROOT: &str = "msme_data";

#[derive(Serialize, Deserialize, Debug)]
struct HubConfigFile {
    data_root: Option<PathBuf>,
}

fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("msme_hub").join("config.json"))
}

/// Load the persisted data root, if one was saved
pub fn load_persistent_root() -> Option<PathBuf> {
    let path = config_file_path()?;
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<HubConfigFile>(&content) {
            Ok(config) => config.data_root,
            Err(e) => {
                warn!("Failed to parse config file at {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read config file at {:?}: {}", path, e);
            None
        }
    }
}

/// Resolve the data root: env var, then persisted config, then `msme_data`
pub fn hub_root() -> PathBuf {
    if let Ok(val) = std::env::var(HUB_ROOT_ENV) {
        return PathBuf::from(val);
    }

    load_persistent_root().unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
}

/// SQLite databases live here
pub fn local_dir(root: &Path) -> PathBuf {
    root.join("local")
}

/// Users and sessions database
pub fn users_db_path(root: &Path) -> PathBuf {
    local_dir(root).join("users.sqlite")
}

/// GST guides imported at startup
pub fn guides_seed_path(root: &Path) -> PathBuf {
    root.join("guides.json")
}

/// Conversation documents
pub fn conversations_dir(root: &Path) -> PathBuf {
    root.join("conversations")
}

/// Ensure a single directory exists
pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Create the complete directory structure under `root`.
///
/// Returns the canonicalized root.
pub fn init_structure(root: &Path) -> anyhow::Result<PathBuf> {
    ensure_dir(root)?;
    ensure_dir(&local_dir(root))?;
    ensure_dir(&conversations_dir(root))?;

    let canonical = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    info!("Data directory structure initialized at: {:?}", canonical);

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_structure_creates_layout() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("hub");

        let canonical = init_structure(&root).unwrap();

        assert!(canonical.is_absolute());
        assert!(local_dir(&root).is_dir());
        assert!(conversations_dir(&root).is_dir());
    }

    #[test]
    fn test_db_path_is_under_local() {
        let root = PathBuf::from("data");
        assert_eq!(
            users_db_path(&root),
            PathBuf::from("data").join("local").join("users.sqlite")
        );
    }
}
