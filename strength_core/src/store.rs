//! Transactional store backends.
//!
//! Every engine operation runs inside `Store::read` or `Store::transaction`.
//! A transaction works on a copy of the database and commits only when the
//! closure returns `Ok`, so a failed operation never leaves partial writes.
//! The engine keeps no state between calls; it reads fresh each time.

use crate::database::Database;
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// A store offering consistent reads and serializable transactions
pub trait Store {
    /// Run `f` against a consistent snapshot
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>;

    /// Run `f` exclusively; its writes commit only if it returns `Ok`
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store guarded by a mutex
#[derive(Debug, Default)]
pub struct MemoryStore {
    db: Mutex<Database>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let guard = self
            .db
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".into()))?;
        f(&guard)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        let mut guard = self
            .db
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".into()))?;
        let mut working = guard.clone();
        let value = f(&mut working)?;
        *guard = working;
        Ok(value)
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// JSON document on disk, shared safely between processes
///
/// A sidecar `.lock` file carries the advisory lock: shared for reads,
/// exclusive for transactions. Commits write a temp file in the same
/// directory, fsync it, and rename it over the document.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let lock_path = path.with_extension("lock");
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)?)
    }

    /// Load the document; a missing file is an empty store, a corrupt one is an error
    fn load(&self) -> Result<Database> {
        if !self.path.exists() {
            tracing::info!("No store file at {:?}, starting empty", self.path);
            return Ok(Database::default());
        }

        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;

        Database::from_json(&contents).map_err(|e| {
            tracing::error!("Store file {:?} is unreadable: {}", self.path, e);
            Error::Store(format!("corrupt store file {:?}: {}", self.path, e))
        })
    }

    fn save(&self, db: &Database) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = NamedTempFile::new_in(dir)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(db.to_json()?.as_bytes())?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Committed store to {:?}", self.path);
        Ok(())
    }
}

impl Store for FileStore {
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let lock = self.lock_file()?;
        lock.lock_shared()?;
        let result = self.load().and_then(|db| f(&db));
        lock.unlock()?;
        result
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;

        let result = self.load().and_then(|mut db| {
            let value = f(&mut db)?;
            self.save(&db)?;
            Ok(value)
        });

        lock.unlock()?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lift, SessionStatus, WorkoutSession};
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;
    use uuid::Uuid;

    fn lift(slug: &str) -> Lift {
        Lift {
            id: Uuid::new_v4(),
            name: slug.to_uppercase(),
            slug: slug.into(),
            parent_id: None,
            is_competition: true,
        }
    }

    fn in_progress(enrollment_id: Uuid) -> WorkoutSession {
        WorkoutSession {
            id: Uuid::new_v4(),
            enrollment_id,
            user_id: "u1".into(),
            week_number: 1,
            cycle_iteration: 1,
            day_index: 0,
            day_id: None,
            status: SessionStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            advance: None,
        }
    }

    fn race_starts<S: Store + Send + Sync + 'static>(store: Arc<S>) -> (usize, usize) {
        let enrollment = Uuid::new_v4();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.transaction(|db| db.insert_session(in_progress(enrollment))))
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(()) => ok += 1,
                Err(Error::SessionAlreadyActive { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        (ok, conflicts)
    }

    #[test]
    fn test_memory_transaction_rolls_back_on_error() {
        let store = MemoryStore::new();
        let result: Result<()> = store.transaction(|db| {
            db.insert_lift(lift("squat"))?;
            Err(Error::Validation("abort".into()))
        });
        assert!(result.is_err());

        let count = store.read(|db| Ok(db.lifts().count())).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_file_store_persists_commits() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.transaction(|db| db.insert_lift(lift("bench"))).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        let found = reopened
            .read(|db| Ok(db.lift_by_slug("bench").is_some()))
            .unwrap();
        assert!(found);
    }

    #[test]
    fn test_file_store_rolls_back_on_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path().join("store.json")).unwrap();
        store.transaction(|db| db.insert_lift(lift("bench"))).unwrap();

        let result: Result<()> = store.transaction(|db| {
            db.insert_lift(lift("deadlift"))?;
            db.insert_lift(lift("bench"))
        });
        assert!(result.is_err());

        let count = store.read(|db| Ok(db.lifts().count())).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        let store = FileStore::open(&path).unwrap();
        let result = store.read(|db| Ok(db.lifts().count()));
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[test]
    fn test_no_stray_temp_files_after_commit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path().join("store.json")).unwrap();
        store.transaction(|db| db.insert_lift(lift("row"))).unwrap();

        let mut names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["store.json", "store.lock"]);
    }

    #[test]
    fn test_concurrent_starts_memory() {
        let (ok, conflicts) = race_starts(Arc::new(MemoryStore::new()));
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
    }

    #[test]
    fn test_concurrent_starts_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path().join("store.json")).unwrap();
        let (ok, conflicts) = race_starts(Arc::new(store));
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
    }
}
