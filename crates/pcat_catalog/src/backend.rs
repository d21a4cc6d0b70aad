//! Storage backends.
//!
//! The artifact store persists through a small key-value interface so the
//! concrete storage (memory, local directory, object store, database) is a
//! substitution detail. Keys are `/`-separated relative paths.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

impl BackendError {
    /// Transient failures may succeed on retry without changing input.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Unavailable(_) => true,
            BackendError::Io { source, .. } => matches!(
                source.kind(),
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
            ),
            BackendError::InvalidKey(_) => false,
        }
    }

    fn io(key: &str, source: io::Error) -> Self {
        BackendError::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// Durable key-value interface the artifact store is written against.
#[cfg_attr(test, mockall::automock)]
pub trait StorageBackend: Send + Sync {
    /// Read a value, `None` when the key is absent.
    fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one.
    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()>;

    /// Atomically write a value unless the key exists.
    ///
    /// Returns `true` when this call created the key.
    fn put_if_absent(&self, key: &str, value: &[u8]) -> BackendResult<bool>;

    /// All keys starting with `prefix`, sorted.
    fn list_prefix(&self, prefix: &str) -> BackendResult<Vec<String>>;
}

fn validate_key(key: &str) -> BackendResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidKey(key.to_string()))
    }
}

/// In-process backend, mostly for tests and ephemeral catalogs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        validate_key(key)?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> BackendResult<bool> {
        validate_key(key)?;
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn list_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Backend storing each key as a file under a root directory.
///
/// Writes go through a temporary file so readers never observe partial
/// values; `put_if_absent` publishes with a hard link, which fails when
/// the target exists.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open (and create if needed) a directory-backed store.
    pub fn open(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| BackendError::io(&root.to_string_lossy(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> BackendResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }

    fn write_temp(&self, key: &str, path: &Path, value: &[u8]) -> BackendResult<PathBuf> {
        let parent = path
            .parent()
            .ok_or_else(|| BackendError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent).map_err(|e| BackendError::io(key, e))?;
        let tmp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).map_err(|e| BackendError::io(key, e))?;
        file.write_all(value).map_err(|e| BackendError::io(key, e))?;
        file.sync_all().map_err(|e| BackendError::io(key, e))?;
        Ok(tmp)
    }
}

impl StorageBackend for FsBackend {
    fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(key, e)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let path = self.path_for(key)?;
        let tmp = self.write_temp(key, &path, value)?;
        fs::rename(&tmp, &path).map_err(|e| BackendError::io(key, e))?;
        debug!("Wrote {} ({} bytes)", key, value.len());
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> BackendResult<bool> {
        let path = self.path_for(key)?;
        if path.exists() {
            return Ok(false);
        }
        let tmp = self.write_temp(key, &path, value)?;
        let result = fs::hard_link(&tmp, &path);
        let _ = fs::remove_file(&tmp);
        match result {
            Ok(()) => {
                debug!("Created {} ({} bytes)", key, value.len());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(BackendError::io(key, e)),
        }
    }

    fn list_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let temp_file = key.rsplit('/').next().is_some_and(|f| f.starts_with(".tmp-"));
            if key.starts_with(prefix) && !temp_file {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(backend: &dyn StorageBackend) {
        assert_eq!(backend.get("a/b").unwrap(), None);
        backend.put("a/b", b"one").unwrap();
        assert_eq!(backend.get("a/b").unwrap(), Some(b"one".to_vec()));

        assert!(!backend.put_if_absent("a/b", b"two").unwrap());
        assert_eq!(backend.get("a/b").unwrap(), Some(b"one".to_vec()));
        assert!(backend.put_if_absent("a/c", b"three").unwrap());

        backend.put("z/d", b"four").unwrap();
        assert_eq!(backend.list_prefix("a/").unwrap(), vec!["a/b", "a/c"]);
        assert_eq!(backend.list_prefix("").unwrap().len(), 3);
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        exercise(&backend);
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn test_fs_backend() {
        let dir = tempdir().unwrap();
        let backend = FsBackend::open(dir.path().join("store")).unwrap();
        exercise(&backend);
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let backend = MemoryBackend::new();
        for key in ["", "/abs", "a/../b", "a//b"] {
            assert!(matches!(backend.put(key, b"x"), Err(BackendError::InvalidKey(_))));
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Unavailable("maintenance".into()).is_transient());
        let timeout = BackendError::io("k", io::Error::new(ErrorKind::TimedOut, "slow"));
        assert!(timeout.is_transient());
        let denied = BackendError::io("k", io::Error::new(ErrorKind::PermissionDenied, "no"));
        assert!(!denied.is_transient());
    }
}
