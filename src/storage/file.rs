//! File-backed storage
//!
//! Stores each record as a JSON file in an XDG-compliant data directory
//! (`~/.local/share/hypercast/` on Linux).

use directories::ProjectDirs;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{check_quota, KeyValueStore, StorageError};

/// Persists records as `<key>.json` files under one directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Directory where record files are stored
    dir: PathBuf,
    /// Optional byte limit across all records in the directory
    quota: Option<usize>,
}

impl FileStorage {
    /// Creates a FileStorage using the XDG-compliant data directory
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "hypercast")?;
        Some(Self::with_dir(project_dirs.data_dir().to_path_buf()))
    }

    /// Creates a FileStorage rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir, quota: None }
    }

    /// Limits the total size of all records to `quota` bytes
    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    /// Directory holding the record files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file backing `key`
    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Total size of every record file except the one for `key`
    fn other_records_size(&self, key: &str) -> Result<usize, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let own = self.item_path(key);
        let mut total = 0usize;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path == own || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            total += entry.metadata()?.len() as usize;
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.item_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.quota.is_some() {
            check_quota(self.quota, self.other_records_size(key)?, value.len())?;
        }

        // Write then rename so readers never observe a partial record
        fs::create_dir_all(&self.dir)?;
        let path = self.item_path(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.item_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
