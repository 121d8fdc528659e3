//! Persistent key/value media backing the local store
//!
//! A medium stores opaque text values under string keys. [`FileMedium`] keeps
//! one file per key in a data directory; [`MemoryMedium`] keeps everything in
//! process memory.
//!
//! ### Directory Structure
//! ```text
//! local-data/
//! ├── relaysql%3Atable%3Aposts.json
//! ├── relaysql%3Atable%3Aprofiles.json
//! └── ...
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;

use crate::error::{RelayError, Result};

const FILE_EXTENSION: &str = "json";

/// A simple persistent key/value medium
pub trait KeyValueMedium: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently stored
    fn keys(&self) -> Result<Vec<String>>;
}

/// File-per-key medium rooted at a data directory
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Open (and create if needed) a medium rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(RelayError::Store("Key cannot be empty".into()));
        }
        Ok(self.dir.join(format!("{}.{}", escape_key(key), FILE_EXTENSION)))
    }
}

impl KeyValueMedium for FileMedium {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;

        // Write to a sibling temp file, then atomically rename over the target
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()).and_then(unescape_key) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-process medium, lost when the process exits
#[derive(Default)]
pub struct MemoryMedium {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueMedium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().unwrap().keys().cloned().collect())
    }
}

/// Escape a key into a portable file name: `[A-Za-z0-9_-]` pass through,
/// everything else becomes `%XX`.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
