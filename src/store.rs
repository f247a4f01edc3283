//! Persistence collaborator: opaque blobs keyed by a namespace string.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ledger::InvariantError;

/// Errors from loading or saving ledger state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid namespace '{0}'")]
    InvalidNamespace(String),

    #[error("failed to encode ledger snapshot: {0}")]
    Encode(serde_json::Error),

    #[error("failed to decode ledger snapshot: {0}")]
    Decode(serde_json::Error),

    #[error("saved ledger is inconsistent: {0}")]
    Inconsistent(#[from] InvariantError),
}

/// Synchronous get/set of a whole-state blob.
///
/// Implementations must return what was last saved under a namespace and
/// commit each save atomically.
pub trait SnapshotStore {
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&mut self, namespace: &str, blob: &[u8]) -> Result<(), StoreError>;
}

/// In-memory store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.get(namespace).cloned())
    }

    fn save(&mut self, namespace: &str, blob: &[u8]) -> Result<(), StoreError> {
        self.blobs.insert(namespace.to_string(), blob.to_vec());
        Ok(())
    }
}

/// Directory-backed store: one `<namespace>.json` file per namespace.
///
/// Writes go to a `.tmp` file first, are synced, then renamed over the
/// final path, so a crash mid-write leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store in `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, namespace: &str) -> Result<PathBuf, StoreError> {
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !namespace.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidNamespace(namespace.to_string()));
        }
        Ok(self.dir.join(format!("{namespace}.json")))
    }
}

impl SnapshotStore for FileStore {
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path(namespace)?;
        match fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, namespace: &str, blob: &[u8]) -> Result<(), StoreError> {
        let path = self.path(namespace)?;
        let tmp_path = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(blob)?;
        file.sync_data()?;
        drop(file);

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}
