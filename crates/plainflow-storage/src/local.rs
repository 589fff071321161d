//! File-backed persistent key/value store.

use crate::{KeyValueStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Persistent store holding a JSON object in a single file.
///
/// Every operation re-reads the file, so several handles on the same path
/// observe each other's writes. Concurrent writers from separate processes
/// are last-write-wins.
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalStorage {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let storage = Self {
            path,
            lock: Mutex::new(()),
        };
        // Surface a corrupt file at open time rather than on first use.
        storage.load()?;
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn store(&self, values: &BTreeMap<String, String>) -> StorageResult<()> {
        let content = serde_json::to_string(values)?;
        atomic_write(&self.path, &content)?;
        debug!(path = %self.path.display(), keys = values.len(), "local storage written");
        Ok(())
    }
}

impl KeyValueStorage for LocalStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.store(&values)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock();
        let mut values = self.load()?;
        let existed = values.remove(key).is_some();
        if existed {
            self.store(&values)?;
        }
        Ok(existed)
    }
}

/// Write via a sibling temp file and rename so readers never see a torn file.
fn atomic_write(path: &Path, content: &str) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StorageError::Backend(format!("invalid storage path {}", path.display())))?;

    let tmp_path = dir.join(format!(
        ".{}.plainflow.tmp.{}",
        file_name,
        std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_storage_basic() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path().join("store.json")).unwrap();

        assert_eq!(storage.get("foo").unwrap(), None);
        storage.set("foo", "bar").unwrap();
        assert_eq!(storage.get("foo").unwrap(), Some("bar".to_string()));

        assert!(storage.remove("foo").unwrap());
        assert!(!storage.remove("foo").unwrap());
        assert_eq!(storage.get("foo").unwrap(), None);
    }

    #[test]
    fn test_local_storage_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let storage = LocalStorage::open(&path).unwrap();
            storage.set("pf:context.referrer", r#"{"id":"baz"}"#).unwrap();
        }

        let reopened = LocalStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get("pf:context.referrer").unwrap(),
            Some(r#"{"id":"baz"}"#.to_string())
        );
    }

    #[test]
    fn test_two_handles_share_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let first = LocalStorage::open(&path).unwrap();
        let second = LocalStorage::open(&path).unwrap();

        first.set("a", "1").unwrap();
        second.set("b", "2").unwrap();

        assert_eq!(first.get("b").unwrap(), Some("2".to_string()));
        assert_eq!(second.get("a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deeply").join("nested").join("store.json");
        let storage = LocalStorage::open(&path).unwrap();
        storage.set("k", "v").unwrap();
        assert!(path.exists());
        assert_eq!(storage.path(), path.as_path());
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{corrupt").unwrap();
        assert!(matches!(
            LocalStorage::open(&path),
            Err(StorageError::Encoding(_))
        ));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path().join("store.json")).unwrap();
        for i in 0..5 {
            storage.set("k", &i.to_string()).unwrap();
        }
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
