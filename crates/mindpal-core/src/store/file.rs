use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{KeyValueStore, StoreError, StoreResult};

/// Key-value store backed by a single JSON object on disk.
///
/// Every call re-reads the file, so separate `FileStore` values pointing at
/// the same path always observe each other's writes. Concurrent writers are
/// last-writer-wins.
///
/// Writes go through a temp file and a rename, so a crash never leaves a
/// half-written table behind. A table that is unreadable anyway (written by
/// something else, or damaged on disk) fails reads but is replaced by the
/// next write.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Load the table for a read-modify-write. A corrupt table is replaced
    /// rather than blocking writes; the flag says it must be rewritten.
    fn load_for_write(&self) -> StoreResult<(BTreeMap<String, String>, bool)> {
        match self.load() {
            Ok(entries) => Ok((entries, false)),
            Err(StoreError::Corrupt { path, source }) => {
                warn!(path = %path, error = %source, "Discarding corrupt store file");
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let contents = serde_json::to_string_pretty(entries)?;
        self.atomic_write(contents.as_bytes())
            .map_err(|source| StoreError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Write to `<file>.tmp`, sync, then rename over the target.
    fn atomic_write(&self, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(data)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        fs::rename(&temp_path, &self.path)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let (mut entries, _) = self.load_for_write()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)?;
        debug!(key = %key, path = %self.path.display(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let (mut entries, recovered) = self.load_for_write()?;
        let removed = entries.remove(key).is_some();
        if removed || recovered {
            self.save(&entries)?;
        }
        if removed {
            debug!(key = %key, path = %self.path.display(), "Removed value");
        }
        Ok(())
    }
}
