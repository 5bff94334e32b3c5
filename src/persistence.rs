//! Flat key/value storage for settings and session data.
//!
//! Two keys are used: [`SETTINGS_KEY`] holds [`Settings`], [`DATA_KEY`] holds
//! [`SavedData`]. Audio samples are never written; a reloaded pad has metadata only.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::Settings;

pub const SETTINGS_KEY: &str = "soundpad-settings";
pub const DATA_KEY: &str = "soundpad-data";

/// Overrides the data directory when no explicit one is given.
pub const DATA_DIR_ENV: &str = "SOUNDPAD_DATA_DIR";

const APP_DIR_NAME: &str = "soundpad";

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the backing store failed.
    #[error("storage error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The stored value is not valid JSON for its key.
    #[error("corrupt stored data for {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded.
    #[error("failed to encode data: {0}")]
    Encode(#[from] serde_json::Error),

    /// No explicit, environment or platform data directory is available.
    #[error("no data directory available")]
    NoDataDir,
}

/// Backing store with string values addressed by key.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// One JSON file per key: `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            key: key.to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;

        // Write next to the target and rename so a crash never leaves half a file.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)
    }
}

/// In-process store, used when no data directory exists and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Picks the data directory: explicit argument, then `SOUNDPAD_DATA_DIR`, then the platform
/// data directory.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, PersistenceError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }

    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(PersistenceError::NoDataDir)
}

fn default_name() -> String {
    crate::pads::DEFAULT_PAD_NAME.to_string()
}

fn default_color() -> String {
    crate::pads::DEFAULT_PAD_COLOR.to_string()
}

fn default_icon() -> String {
    crate::pads::DEFAULT_PAD_ICON.to_string()
}

/// Stored pad metadata. An empty `hotkey` means none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadRecord {
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub hotkey: String,
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub duration: String,
}

/// Contents of the `soundpad-data` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedData {
    #[serde(default)]
    pub pads: Vec<PadRecord>,
    #[serde(default)]
    pub playlist: Vec<PlaylistRecord>,
}

fn load_json<T>(storage: &dyn Storage, key: &str) -> Result<Option<T>, PersistenceError>
where
    T: for<'de> Deserialize<'de>,
{
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| PersistenceError::Corrupt {
            key: key.to_string(),
            source,
        })
}

fn save_json<T: Serialize>(
    storage: &mut dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let raw = serde_json::to_string(value)?;
    storage.set(key, &raw)
}

pub fn load_settings(storage: &dyn Storage) -> Result<Option<Settings>, PersistenceError> {
    load_json(storage, SETTINGS_KEY)
}

pub fn save_settings(storage: &mut dyn Storage, settings: &Settings) -> Result<(), PersistenceError> {
    save_json(storage, SETTINGS_KEY, settings)
}

pub fn load_data(storage: &dyn Storage) -> Result<Option<SavedData>, PersistenceError> {
    load_json(storage, DATA_KEY)
}

pub fn save_data(storage: &mut dyn Storage, data: &SavedData) -> Result<(), PersistenceError> {
    save_json(storage, DATA_KEY, data)
}
