//! Rotation state and run status persistence
//!
//! Each account owns four independent records keyed by its state prefix:
//! the caption cursor, the image cursor, the set of used video filenames and
//! the status of its most recent run. [`FileStateStore`] keeps them in the
//! same JSON files earlier versions wrote (`{prefix}_caption.json`,
//! `{prefix}_image.json`, `{prefix}_video_used.json`, `{prefix}_status.json`)
//! so existing rotations resume where they stopped. [`MemoryStateStore`]
//! backs tests.
//!
//! Writes replace the whole record. Read-modify-write sequences are not
//! atomic across concurrent runs on the same key; see
//! [`crate::service::publishing`] for the in-process guard.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ConfigError, Result, StoreError};
use crate::types::{RotationState, RunStatus};

/// Which rotation cursor a record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cursor {
    Caption,
    Image,
}

impl Cursor {
    fn suffix(&self) -> &'static str {
        match self {
            Cursor::Caption => "caption",
            Cursor::Image => "image",
        }
    }
}

/// Storage backend for per-account rotation state
pub trait StateStore: Send + Sync {
    /// Current value of a cursor; zero when nothing was stored yet
    fn load_cursor(&self, key: &str, cursor: Cursor) -> Result<u64>;

    fn save_cursor(&self, key: &str, cursor: Cursor, value: u64) -> Result<()>;

    /// Filenames already published; empty when nothing was stored yet
    fn load_used_videos(&self, key: &str) -> Result<BTreeSet<String>>;

    fn save_used_videos(&self, key: &str, used: &BTreeSet<String>) -> Result<()>;

    /// Last run status; [`RunStatus::default`] (never run) when absent
    fn load_status(&self, key: &str) -> Result<RunStatus>;

    fn save_status(&self, key: &str, status: &RunStatus) -> Result<()>;

    /// Backend identifier for logging
    fn backend_name(&self) -> &str;

    /// All rotation records of an account at once
    fn rotation(&self, key: &str) -> Result<RotationState> {
        Ok(RotationState {
            caption_cursor: self.load_cursor(key, Cursor::Caption)?,
            image_cursor: self.load_cursor(key, Cursor::Image)?,
            used_videos: self.load_used_videos(key)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    #[serde(default)]
    last_index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct UsedRecord {
    #[serde(default)]
    used: Vec<String>,
}

/// JSON files in a state directory
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str, record: &str) -> Result<PathBuf> {
        if key.trim().is_empty() {
            return Err(ConfigError::MissingField("state_prefix".to_string()).into());
        }
        Ok(self.dir.join(format!("{}_{}.json", key, record)))
    }

    fn read<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value = serde_json::from_str(&content).map_err(StoreError::Serialize)?;
        Ok(Some(value))
    }

    fn write<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value).map_err(StoreError::Serialize)?;
        write_atomic(path, content.as_bytes())?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load_cursor(&self, key: &str, cursor: Cursor) -> Result<u64> {
        let path = self.path(key, cursor.suffix())?;
        Ok(Self::read::<IndexRecord>(&path)?
            .map(|r| r.last_index)
            .unwrap_or(0))
    }

    fn save_cursor(&self, key: &str, cursor: Cursor, value: u64) -> Result<()> {
        let path = self.path(key, cursor.suffix())?;
        Self::write(&path, &IndexRecord { last_index: value })
    }

    fn load_used_videos(&self, key: &str) -> Result<BTreeSet<String>> {
        let path = self.path(key, "video_used")?;
        Ok(Self::read::<UsedRecord>(&path)?
            .map(|r| r.used.into_iter().map(decode_file_name).collect())
            .unwrap_or_default())
    }

    fn save_used_videos(&self, key: &str, used: &BTreeSet<String>) -> Result<()> {
        let path = self.path(key, "video_used")?;
        Self::write(
            &path,
            &UsedRecord {
                used: used.iter().cloned().collect(),
            },
        )
    }

    fn load_status(&self, key: &str) -> Result<RunStatus> {
        let path = self.path(key, "status")?;
        match Self::read::<RunStatus>(&path) {
            Ok(status) => Ok(status.unwrap_or_default()),
            Err(crate::error::GramcastError::Store(StoreError::Serialize(e))) => {
                // A status record is informational only
                tracing::warn!("Corrupted status file {}, ignoring: {}", path.display(), e);
                Ok(RunStatus::default())
            }
            Err(e) => Err(e),
        }
    }

    fn save_status(&self, key: &str, status: &RunStatus) -> Result<()> {
        let path = self.path(key, "status")?;
        Self::write(&path, status)
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

/// Replace a file's contents through a sibling temp file and a rename
///
/// Parent directories are created as needed, so state prefixes such as
/// `state/main` keep working.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::result::Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[derive(Debug, Default, Clone)]
struct MemoryEntry {
    cursors: HashMap<Cursor, u64>,
    used: BTreeSet<String>,
    status: Option<RunStatus>,
}

/// Older used lists may hold names as they appeared in the URL
fn decode_file_name(name: String) -> String {
    let decoded = urlencoding::decode(&name).map(|s| s.into_owned());
    decoded.unwrap_or(name)
}

/// In-process store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(&self, key: &str, f: impl FnOnce(&mut MemoryEntry) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(entries.entry(key.to_string()).or_default())
    }
}

impl StateStore for MemoryStateStore {
    fn load_cursor(&self, key: &str, cursor: Cursor) -> Result<u64> {
        Ok(self.with_entry(key, |e| e.cursors.get(&cursor).copied().unwrap_or(0)))
    }

    fn save_cursor(&self, key: &str, cursor: Cursor, value: u64) -> Result<()> {
        self.with_entry(key, |e| {
            e.cursors.insert(cursor, value);
        });
        Ok(())
    }

    fn load_used_videos(&self, key: &str) -> Result<BTreeSet<String>> {
        Ok(self.with_entry(key, |e| e.used.clone()))
    }

    fn save_used_videos(&self, key: &str, used: &BTreeSet<String>) -> Result<()> {
        self.with_entry(key, |e| e.used = used.clone());
        Ok(())
    }

    fn load_status(&self, key: &str) -> Result<RunStatus> {
        Ok(self.with_entry(key, |e| e.status.clone().unwrap_or_default()))
    }

    fn save_status(&self, key: &str, status: &RunStatus) -> Result<()> {
        self.with_entry(key, |e| e.status = Some(status.clone()));
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
