//! Save slot persistence.
//!
//! Progress is stored as a single JSON record under a fixed key, and the
//! player's display name under a second key. The [`SaveStore`] trait is the
//! platform key-value seam; [`FileSaveStore`] and [`MemorySaveStore`] are
//! provided.

use crate::state::ChatMessage;
use crate::variables::StoryValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported save version {found} (newest supported is {supported})")]
    UnsupportedVersion { supported: u32, found: u32 },

    #[error("Save store unavailable: {0}")]
    Unavailable(String),
}

/// Current save record version.
pub const SAVE_VERSION: u32 = 1;

/// Default key of the progress slot.
pub const PROGRESS_KEY: &str = "gameProgress";

/// Default key of the player name slot.
pub const PLAYER_NAME_KEY: &str = "playerName";

/// Key-value persistence by string key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SaveStore: Send + Sync {
    /// Read a slot. `Ok(None)` means the slot is empty.
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Write a slot, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Delete a slot. Removing an empty slot is not an error.
    async fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// Names of the two save slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveKeys {
    pub progress: String,
    pub player_name: String,
}

impl Default for SaveKeys {
    fn default() -> Self {
        Self {
            progress: PROGRESS_KEY.to_string(),
            player_name: PLAYER_NAME_KEY.to_string(),
        }
    }
}

/// The persisted progress record.
///
/// Every field except the version may be missing in older or partial
/// records and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProgress {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub variables: BTreeMap<String, StoryValue>,

    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,

    #[serde(default)]
    pub current_node_id: Option<String>,

    #[serde(default)]
    pub game_started: bool,

    #[serde(default = "default_view")]
    pub current_view: String,

    #[serde(default = "default_chapter")]
    pub current_chapter: u32,

    #[serde(default = "default_chapter")]
    pub current_part: u32,

    #[serde(default = "default_true")]
    pub npc_connected: bool,

    #[serde(default)]
    pub blocked: bool,

    /// A part ended and its successor has not been entered yet.
    #[serde(default)]
    pub part_intro_pending: bool,

    /// Named script the position refers to, instead of the current part.
    #[serde(default)]
    pub active_script: Option<String>,
}

fn default_version() -> u32 {
    SAVE_VERSION
}

pub(crate) fn default_view() -> String {
    "home".to_string()
}

fn default_chapter() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl SavedProgress {
    /// Parse a record, rejecting versions newer than this build understands.
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(json)?;
        if saved.version > SAVE_VERSION {
            return Err(PersistError::UnsupportedVersion {
                supported: SAVE_VERSION,
                found: saved.version,
            });
        }
        Ok(saved)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// In-memory save store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek at a slot without going through the async API.
    pub fn slot(&self, key: &str) -> Option<String> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(key).cloned())
    }

    /// Write a slot directly, e.g. to seed a corrupted record in a test.
    pub fn put(&self, key: &str, value: impl Into<String>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(key.to_string(), value.into());
        }
    }
}

#[async_trait]
impl SaveStore for MemorySaveStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let slots = self
            .slots
            .lock()
            .map_err(|e| PersistError::Unavailable(e.to_string()))?;
        Ok(slots.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| PersistError::Unavailable(e.to_string()))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| PersistError::Unavailable(e.to_string()))?;
        slots.remove(key);
        Ok(())
    }
}

/// File-backed save store: one file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    dir: PathBuf,
}

impl FileSaveStore {
    /// Store slots under `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing a key.
    pub fn slot_path(&self, key: &str) -> PathBuf {
        let sanitized = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{sanitized}.json"))
    }
}

#[async_trait]
impl SaveStore for FileSaveStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.slot_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash mid-write never truncates the slot
        let path = self.slot_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.slot_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
