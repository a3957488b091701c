use kassa_core::MatchedIds;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed matched-id state: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Failed to replace state file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Durable set of transaction keys reconciled in earlier runs.
///
/// One run owns the store between `load` and `save`; concurrent runs against
/// the same backing state must be serialized by the caller.
pub trait MatchedIdStore: Send + Sync {
    /// Reads the persisted set, distinguishing "nothing stored" (empty set)
    /// from unreadable state.
    fn try_load(&self) -> Result<MatchedIds, StoreError>;

    /// Replaces the persisted set with `ids`.
    fn save(&self, ids: &MatchedIds) -> Result<(), StoreError>;

    /// Like [`try_load`](Self::try_load) but never fails: unreadable state is
    /// logged and treated as empty.
    fn load(&self) -> MatchedIds {
        match self.try_load() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Ignoring unreadable matched-id state, starting empty: {e}");
                MatchedIds::new()
            }
        }
    }
}

/// Stores the set as a sorted JSON array of strings.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MatchedIdStore for JsonFileStore {
    fn try_load(&self) -> Result<MatchedIds, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No matched-id state at {}, starting empty", self.path.display());
                return Ok(MatchedIds::new());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(MatchedIds::new());
        }

        let ids: MatchedIds = serde_json::from_slice(&bytes)?;
        tracing::debug!("Loaded {} matched ids from {}", ids.len(), self.path.display());
        Ok(ids)
    }

    /// Writes to a temp file beside the target and renames it into place, so
    /// a crash mid-write leaves the previous state intact.
    fn save(&self, ids: &MatchedIds) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, ids)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        tracing::debug!("Saved {} matched ids to {}", ids.len(), self.path.display());
        Ok(())
    }
}

/// In-process store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ids: Mutex<MatchedIds>,
}

impl MemoryStore {
    pub fn new(ids: MatchedIds) -> Self {
        Self { ids: Mutex::new(ids) }
    }

    pub fn snapshot(&self) -> MatchedIds {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl MatchedIdStore for MemoryStore {
    fn try_load(&self) -> Result<MatchedIds, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, ids: &MatchedIds) -> Result<(), StoreError> {
        *self.ids.lock().unwrap_or_else(PoisonError::into_inner) = ids.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> MatchedIds {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("matched.json"));
        assert!(store.try_load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("matched.json"));
        let set = ids(&["privat:1", "poster:2", "privat:Ідент"]);

        store.save(&set).unwrap();
        assert_eq!(store.load(), set);
    }

    #[test]
    fn save_of_load_leaves_content_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matched.json");
        let store = JsonFileStore::new(&path);
        store.save(&ids(&["b", "a", "c"])).unwrap();
        let before = fs::read(&path).unwrap();

        store.save(&store.load()).unwrap();

        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn malformed_state_is_an_error_but_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matched.json");
        fs::write(&path, b"{not json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.try_load(), Err(StoreError::Malformed(_))));
        assert!(store.load().is_empty());
    }

    #[test]
    fn blank_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matched.json");
        fs::write(&path, b"  \n").unwrap();
        assert!(JsonFileStore::new(&path).try_load().unwrap().is_empty());
    }

    #[test]
    fn save_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("matched.json"));
        store.save(&ids(&["x", "y"])).unwrap();
        store.save(&ids(&["z"])).unwrap();
        assert_eq!(store.load(), ids(&["z"]));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("matched.json"));
        store.save(&ids(&["x"])).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn memory_store_roundtrips() {
        let store = MemoryStore::default();
        store.save(&ids(&["privat:1"])).unwrap();
        assert_eq!(store.load(), ids(&["privat:1"]));
    }
}
