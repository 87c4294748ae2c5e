//! Key-value persistence for durable view preferences.

use color_eyre::Result;
use fs2::FileExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::ConfigManager;

/// Durable JSON blobs by key. Reads never fail: a missing or unreadable
/// entry is `None` and the caller falls back to defaults.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// One pretty-printed JSON file per key under `<config_dir>/views/`.
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn from_config(config: &ConfigManager) -> Self {
        Self::new(config.config_path("views"))
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

fn read_locked(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    file.lock_shared()?;
    let mut content = String::new();
    let read = file.read_to_string(&mut content);
    file.unlock()?;
    read.map(|_| content)
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key);
        let content = match read_locked(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not read stored view: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring corrupt stored view: {}", e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(&value)?;

        // Truncated under the lock; readers hold a shared lock.
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        file.set_len(0)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        file.unlock()?;
        tracing::debug!(path = %path.display(), "stored view written");
        Ok(())
    }
}

/// In-process store for tests and headless runs.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| color_eyre::eyre::eyre!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}
