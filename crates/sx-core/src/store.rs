//! Locked, file-backed record storage
//!
//! Both the inventory and the pending registry are small TOML files that are
//! read and rewritten in full on every mutation. The registration daemon and
//! short-lived CLI invocations touch the same files, so every access holds:
//!
//! 1. an in-process async mutex (serializes tasks inside one process), and
//! 2. an exclusive `flock(2)` on a sibling `.lock` file (serializes processes).
//!
//! Writes go to a temporary file which is then renamed over the store, so a
//! reader never observes a partially written file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::types::Record;

/// On-disk layout: a single `hosts` array of records
#[derive(Deserialize)]
struct RecordFile<T> {
    #[serde(default = "Vec::new")]
    hosts: Vec<T>,
}

#[derive(Serialize)]
struct RecordFileRef<'a, T> {
    hosts: &'a [T],
}

/// A store of address-keyed records persisted as one file
pub struct RecordStore<T> {
    path: PathBuf,
    lock_path: PathBuf,
    local: Arc<Mutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> RecordStore<T> {
    /// Create a store backed by `path`. Nothing is touched on disk until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self {
            path,
            lock_path,
            local: Arc::new(Mutex::new(())),
            _marker: PhantomData,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire both locks and load the current records.
    ///
    /// The returned guard keeps the store locked until it is committed or dropped.
    pub async fn lock(&self) -> Result<StoreGuard<T>, StoreError> {
        let local = Arc::clone(&self.local).lock_owned().await;

        let lock_path = self.lock_path.clone();
        let file_lock = tokio::task::spawn_blocking(move || FileLock::acquire(&lock_path))
            .await
            .map_err(|e| StoreError::io(&self.lock_path, std::io::Error::other(e)))??;

        let records = read_records(&self.path)?;

        Ok(StoreGuard {
            path: self.path.clone(),
            records,
            dirty: false,
            _file_lock: file_lock,
            _local: local,
        })
    }

    /// Load a consistent snapshot of all records
    pub async fn load(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.lock().await?.into_records())
    }

    /// Apply `f` under lock and persist the result if anything changed
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut StoreGuard<T>) -> R,
    ) -> Result<R, StoreError> {
        let mut guard = self.lock().await?;
        let result = f(&mut guard);
        guard.commit()?;
        Ok(result)
    }
}

/// Exclusive access to a loaded store
///
/// Changes are kept in memory until [`StoreGuard::commit`]. Dropping the guard
/// without committing leaves the file untouched.
pub struct StoreGuard<T> {
    path: PathBuf,
    records: Vec<T>,
    dirty: bool,
    _file_lock: FileLock,
    _local: OwnedMutexGuard<()>,
}

impl<T: Record> StoreGuard<T> {
    /// Records in insertion order
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Find the record for `address`
    pub fn find(&self, address: &str) -> Option<&T> {
        self.records.iter().find(|r| r.address() == address)
    }

    /// Whether a record for `address` exists
    pub fn contains(&self, address: &str) -> bool {
        self.find(address).is_some()
    }

    /// Append a record. Returns `false` (and changes nothing) if the address is taken.
    pub fn insert(&mut self, record: T) -> bool {
        if self.contains(record.address()) {
            return false;
        }
        self.records.push(record);
        self.dirty = true;
        true
    }

    /// Remove and return the record for `address`
    pub fn remove(&mut self, address: &str) -> Option<T> {
        let index = self.records.iter().position(|r| r.address() == address)?;
        self.dirty = true;
        Some(self.records.remove(index))
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
        self.dirty = true;
    }

    /// Persist pending changes and release the locks
    pub fn commit(self) -> Result<(), StoreError> {
        if self.dirty {
            write_records(&self.path, &self.records)?;
            tracing::debug!("Wrote {} records to {:?}", self.records.len(), self.path);
        }
        Ok(())
    }

    fn into_records(self) -> Vec<T> {
        self.records
    }
}

/// Exclusive advisory lock held on a file for the lifetime of the value
#[cfg_attr(not(unix), allow(dead_code))]
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        ensure_parent(path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            loop {
                let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
                if result == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::Interrupted {
                    return Err(StoreError::io(path, err));
                }
            }
        }

        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn read_records<T: Record>(path: &Path) -> Result<Vec<T>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let file: RecordFile<T> =
                toml::from_str(&content).map_err(|source| StoreError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(file.hosts)
        }
        // First run: no store yet
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Write `records` to `path` through a temporary file and an atomic rename
fn write_records<T: Record>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let content = toml::to_string_pretty(&RecordFileRef { hosts: records })?;
    ensure_parent(path)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    {
        #[cfg(unix)]
        let mut file = {
            use std::os::unix::fs::OpenOptionsExt;
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp_path)
                .map_err(|e| StoreError::io(&tmp_path, e))?
        };
        #[cfg(not(unix))]
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| StoreError::io(&tmp_path, e))?;

        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostEntry;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RecordStore<HostEntry> {
        RecordStore::new(dir.path().join("hosts.toml"))
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_persists_in_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .update(|g| {
                g.insert(HostEntry::new("web1", "10.0.0.5"));
                g.insert(HostEntry::new("web2", "10.0.0.6"));
            })
            .await
            .unwrap();

        let reopened = RecordStore::<HostEntry>::new(store.path());
        let hosts = reopened.load().await.unwrap();
        assert_eq!(
            hosts,
            vec![
                HostEntry::new("web1", "10.0.0.5"),
                HostEntry::new("web2", "10.0.0.6")
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let inserted = store
            .update(|g| {
                let first = g.insert(HostEntry::new("web1", "10.0.0.5"));
                let second = g.insert(HostEntry::new("other", "10.0.0.5"));
                (first, second)
            })
            .await
            .unwrap();

        assert_eq!(inserted, (true, false));
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_guard_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .update(|g| g.insert(HostEntry::new("web1", "10.0.0.5")))
            .await
            .unwrap();
        let before = fs::read(store.path()).unwrap();

        {
            let mut guard = store.lock().await.unwrap();
            guard.remove("10.0.0.5");
            guard.insert(HostEntry::new("web9", "10.0.0.9"));
        }

        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_unchanged_update_does_not_create_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.update(|g| g.contains("10.0.0.5")).await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "hosts = [[[").unwrap();

        assert!(matches!(
            store.load().await,
            Err(StoreError::Parse { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_independent_handles_do_not_lose_updates() {
        // Separate handles share no in-process mutex, like separate processes.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts.toml");

        let mut tasks = Vec::new();
        for i in 0..16 {
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                let store = RecordStore::<HostEntry>::new(path);
                store
                    .update(|g| g.insert(HostEntry::new(format!("h{}", i), format!("10.0.1.{}", i))))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let hosts = RecordStore::<HostEntry>::new(&path).load().await.unwrap();
        assert_eq!(hosts.len(), 16);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .update(|g| g.insert(HostEntry::new("web1", "10.0.0.5")))
            .await
            .unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
