//! Upstream dataset stores
//!
//! The trainer only ever sees raw columnar bytes keyed by a dataset id.
//! Stores are injected into the service, never reached through globals.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{MemboostError, Result};

/// Raw columnar bytes keyed by dataset id
pub trait DatasetStore: Send + Sync {
    /// Bytes for `dataset_id`, or `None` when the store has nothing under it
    fn get(&self, dataset_id: &str) -> Result<Option<Arc<[u8]>>>;

    fn put(&self, dataset_id: &str, bytes: Vec<u8>) -> Result<()>;

    /// Remove `dataset_id`; returns whether anything was deleted
    fn delete(&self, dataset_id: &str) -> Result<bool>;
}

impl<S: DatasetStore + ?Sized> DatasetStore for Arc<S> {
    fn get(&self, dataset_id: &str) -> Result<Option<Arc<[u8]>>> {
        (**self).get(dataset_id)
    }

    fn put(&self, dataset_id: &str, bytes: Vec<u8>) -> Result<()> {
        (**self).put(dataset_id, bytes)
    }

    fn delete(&self, dataset_id: &str) -> Result<bool> {
        (**self).delete(dataset_id)
    }
}

/// Process-local store, used by tests and embedders
#[derive(Debug, Default)]
pub struct InMemoryStore {
    datasets: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.datasets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.read().is_empty()
    }

    pub fn contains(&self, dataset_id: &str) -> bool {
        self.datasets.read().contains_key(dataset_id)
    }
}

impl DatasetStore for InMemoryStore {
    fn get(&self, dataset_id: &str) -> Result<Option<Arc<[u8]>>> {
        Ok(self.datasets.read().get(dataset_id).cloned())
    }

    fn put(&self, dataset_id: &str, bytes: Vec<u8>) -> Result<()> {
        self.datasets.write().insert(dataset_id.to_string(), bytes.into());
        Ok(())
    }

    fn delete(&self, dataset_id: &str) -> Result<bool> {
        Ok(self.datasets.write().remove(dataset_id).is_some())
    }
}

/// Parquet files laid out as `<root>/<dataset_id>.parquet`
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `dataset_id`. Ids that could escape the root are rejected.
    pub fn path_for(&self, dataset_id: &str) -> Result<PathBuf> {
        let valid = !dataset_id.is_empty()
            && dataset_id != "."
            && dataset_id != ".."
            && !dataset_id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(MemboostError::StoreError(format!("invalid dataset id '{}'", dataset_id)));
        }
        Ok(self.root.join(format!("{}.parquet", dataset_id)))
    }
}

impl DatasetStore for DirectoryStore {
    fn get(&self, dataset_id: &str) -> Result<Option<Arc<[u8]>>> {
        let path = self.path_for(dataset_id)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "Dataset read");
                Ok(Some(bytes.into()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, dataset_id: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(dataset_id)?;
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    fn delete(&self, dataset_id: &str) -> Result<bool> {
        let path = self.path_for(dataset_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.put("a", vec![1, 2, 3]).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(store.len(), 1);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_directory_store_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("datasets"));

        assert!(store.get("sales").unwrap().is_none());
        store.put("sales", b"PAR1".to_vec()).unwrap();
        assert!(dir.path().join("datasets/sales.parquet").exists());
        assert_eq!(store.get("sales").unwrap().as_deref(), Some(&b"PAR1"[..]));

        assert!(store.delete("sales").unwrap());
        assert!(!store.delete("sales").unwrap());
    }

    #[test]
    fn test_directory_store_rejects_escaping_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(matches!(store.get("../etc"), Err(MemboostError::StoreError(_))));
        assert!(store.put("", vec![]).is_err());
    }

    #[test]
    fn test_shared_store_through_arc() {
        let store: Arc<dyn DatasetStore> = Arc::new(InMemoryStore::new());
        store.put("x", vec![9]).unwrap();
        assert!(store.get("x").unwrap().is_some());
    }
}
