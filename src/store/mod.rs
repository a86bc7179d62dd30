//! Ordered key-value stores backing tables and indexes.
//!
//! A [`Store`] is one open sled database; a [`StoreMap`] is one named tree
//! inside it. Stores are shared through the [`StoreCache`] so that every table
//! and index object referencing the same path sees the same handle.

mod cache;
mod error;

use std::{
    ops::Bound,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use sled::IVec;
use ulid::Generator;

pub use self::{cache::StoreCache, error::StoreError};
use crate::observability::{log_debug, log_info, log_warn};

/// Identifies a table object that writes into a store.
pub type WriterId = u64;

/// Prefix of the scratch maps created by bulk index builds.
pub(crate) const TEMP_MAP_PREFIX: &str = "temp.";

const SLED_DEFAULT_TREE: &[u8] = b"__sled__default";

pub struct Store {
    path: Arc<PathBuf>,
    db: sled::Db,
    read_only: bool,
    closed: Arc<AtomicBool>,
    writer: Mutex<Option<WriterId>>,
    temp_names: Mutex<Generator>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Store {
    pub(crate) fn open(
        path: &Path,
        read_only: bool,
        cache_capacity: Option<u64>,
    ) -> Result<Self, StoreError> {
        if read_only && !path.exists() {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let mut config = sled::Config::new().path(path);
        if let Some(capacity) = cache_capacity {
            config = config.cache_capacity(capacity);
        }
        let db = config.open()?;
        let store = Store {
            path: Arc::new(path.to_path_buf()),
            db,
            read_only,
            closed: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(None),
            temp_names: Mutex::new(Generator::new()),
        };
        if !read_only {
            store.drop_stale_temp_maps()?;
        }
        log_info!(
            component = "store",
            event = "store_opened",
            path = %path.display(),
            read_only,
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Open (creating when writable) the named map.
    pub fn open_map(&self, name: &str) -> Result<StoreMap, StoreError> {
        self.ensure_open()?;
        if self.read_only && !self.has_map(name) {
            return Err(StoreError::MapNotFound {
                path: self.path.to_path_buf(),
                name: name.to_string(),
            });
        }
        let tree = self.db.open_tree(name)?;
        Ok(StoreMap {
            name: name.to_string(),
            tree,
            path: self.path.clone(),
            read_only: self.read_only,
            closed: self.closed.clone(),
        })
    }

    pub fn has_map(&self, name: &str) -> bool {
        self.db
            .tree_names()
            .iter()
            .any(|tree| tree.as_ref() == name.as_bytes())
    }

    /// Names of every user map in the store.
    pub fn map_names(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .filter(|name| name.as_ref() != SLED_DEFAULT_TREE)
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect()
    }

    /// Delete the named map and its contents. Returns whether it existed.
    pub fn remove_map(&self, name: &str) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        Ok(self.db.drop_tree(name)?)
    }

    /// A fresh map name that sorts after every name handed out before.
    pub fn next_temporary_map_name(&self) -> Result<String, StoreError> {
        let id = self
            .temp_names
            .lock()
            .generate()
            .map_err(|_| StoreError::TempNameOverflow {
                path: self.path.to_path_buf(),
            })?;
        Ok(format!("{TEMP_MAP_PREFIX}{id}"))
    }

    /// Flush dirty pages to disk. A no-op for read-only stores.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if !self.read_only {
            self.db.flush()?;
        }
        Ok(())
    }

    /// Record `writer` as the in-flight writer unless another one already is.
    pub(crate) fn claim_writer(&self, writer: WriterId) {
        let mut slot = self.writer.lock();
        if slot.is_none() {
            *slot = Some(writer);
        }
    }

    pub(crate) fn release_writer(&self, writer: WriterId) {
        let mut slot = self.writer.lock();
        if *slot == Some(writer) {
            *slot = None;
        }
    }

    pub(crate) fn in_flight_writer(&self) -> Option<WriterId> {
        *self.writer.lock()
    }

    /// Flush and mark the store closed. Called by the cache once the last
    /// reference is released.
    pub(crate) fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = if self.read_only {
            Ok(())
        } else {
            self.db.flush().map(|_| ()).map_err(StoreError::from)
        };
        log_info!(
            component = "store",
            event = "store_closed",
            path = %self.path.display(),
        );
        flushed
    }

    fn drop_stale_temp_maps(&self) -> Result<(), StoreError> {
        for name in self.map_names() {
            if name.starts_with(TEMP_MAP_PREFIX) {
                log_warn!(
                    component = "store",
                    event = "stale_temp_map_dropped",
                    path = %self.path.display(),
                    map = %name,
                );
                self.db.drop_tree(name.as_bytes())?;
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed {
                path: self.path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.read_only {
            return Err(StoreError::ReadOnly {
                path: self.path.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// One named, ordered map inside a [`Store`].
#[derive(Clone)]
pub struct StoreMap {
    name: String,
    tree: sled::Tree,
    path: Arc<PathBuf>,
    read_only: bool,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for StoreMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreMap")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl StoreMap {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<IVec>, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.get(key)?)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.contains_key(key)?)
    }

    /// Insert or overwrite, returning the previous value.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<Option<IVec>, StoreError> {
        self.ensure_writable()?;
        Ok(self.tree.insert(key, value)?)
    }

    /// Insert only if `key` is absent. Returns `false` when the key existed.
    pub fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        let swapped = self
            .tree
            .compare_and_swap(key, None::<&[u8]>, Some(value))?;
        Ok(swapped.is_ok())
    }

    pub fn remove(&self, key: &[u8]) -> Result<Option<IVec>, StoreError> {
        self.ensure_writable()?;
        Ok(self.tree.remove(key)?)
    }

    pub fn first(&self) -> Result<Option<(IVec, IVec)>, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.first()?)
    }

    pub fn last(&self) -> Result<Option<(IVec, IVec)>, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.last()?)
    }

    /// Lowest entry whose key is `>= key`.
    pub fn ceiling(&self, key: &[u8]) -> Result<Option<(IVec, IVec)>, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.range(key..).next().transpose()?)
    }

    pub fn range(
        &self,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    ) -> Result<sled::Iter, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.range((lower, upper)))
    }

    pub fn iter(&self) -> Result<sled::Iter, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.iter())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        Ok(self.tree.clear()?)
    }

    /// Exact entry count. Walks the whole map, so callers cache it.
    pub fn len(&self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.tree.is_empty())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed {
                path: self.path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.read_only {
            log_debug!(
                component = "store",
                event = "write_rejected",
                path = %self.path.display(),
                map = %self.name,
            );
            return Err(StoreError::ReadOnly {
                path: self.path.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use super::{Store, StoreError, TEMP_MAP_PREFIX};

    #[test]
    fn maps_are_ordered_and_independent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(&temp_dir.path().join("t.table"), false, None).unwrap();

        let a = store.open_map("a").unwrap();
        let b = store.open_map("b").unwrap();
        a.insert(&[3], b"three").unwrap();
        a.insert(&[1], b"one").unwrap();
        b.insert(&[2], b"two").unwrap();

        let keys: Vec<_> = a
            .range(Bound::Unbounded, Bound::Unbounded)
            .unwrap()
            .map(|item| item.unwrap().0.to_vec())
            .collect();
        assert_eq!(keys, vec![vec![1], vec![3]]);
        assert_eq!(b.len().unwrap(), 1);
        assert_eq!(a.ceiling(&[2]).unwrap().unwrap().0.as_ref(), &[3]);

        let mut names = store.map_names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn insert_new_refuses_existing_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(&temp_dir.path().join("t.table"), false, None).unwrap();
        let map = store.open_map("rows").unwrap();

        assert!(map.insert_new(b"k", b"v1").unwrap());
        assert!(!map.insert_new(b"k", b"v2").unwrap());
        assert_eq!(map.get(b"k").unwrap().unwrap().as_ref(), b"v1");
    }

    #[test]
    fn temporary_names_are_monotonic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(&temp_dir.path().join("t.table"), false, None).unwrap();

        let first = store.next_temporary_map_name().unwrap();
        let second = store.next_temporary_map_name().unwrap();
        assert!(first.starts_with(TEMP_MAP_PREFIX));
        assert!(first < second);
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.table");
        {
            let store = Store::open(&path, false, None).unwrap();
            store.open_map("rows").unwrap().insert(b"k", b"v").unwrap();
            store.close().unwrap();
        }

        let store = Store::open(&path, true, None).unwrap();
        let rows = store.open_map("rows").unwrap();
        assert_eq!(rows.get(b"k").unwrap().unwrap().as_ref(), b"v");
        assert!(matches!(
            rows.insert(b"k", b"w"),
            Err(StoreError::ReadOnly { .. })
        ));
        assert!(matches!(
            store.open_map("missing"),
            Err(StoreError::MapNotFound { .. })
        ));
    }

    #[test]
    fn read_only_open_of_missing_path_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = Store::open(&temp_dir.path().join("none.table"), true, None);
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn closed_store_rejects_access() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(&temp_dir.path().join("t.table"), false, None).unwrap();
        let rows = store.open_map("rows").unwrap();

        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(rows.get(b"k"), Err(StoreError::Closed { .. })));
        assert!(matches!(store.open_map("rows"), Err(StoreError::Closed { .. })));
    }

    #[test]
    fn stale_temp_maps_are_dropped_on_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.table.index");
        {
            let store = Store::open(&path, false, None).unwrap();
            let name = store.next_temporary_map_name().unwrap();
            store.open_map(&name).unwrap().insert(b"k", b"").unwrap();
            store.open_map("index.A").unwrap();
            store.close().unwrap();
        }

        let store = Store::open(&path, false, None).unwrap();
        assert_eq!(store.map_names(), vec!["index.A".to_string()]);
    }

    #[test]
    fn writer_slot_is_first_come() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Store::open(&temp_dir.path().join("t.table"), false, None).unwrap();

        store.claim_writer(1);
        store.claim_writer(2);
        assert_eq!(store.in_flight_writer(), Some(1));
        store.release_writer(2);
        assert_eq!(store.in_flight_writer(), Some(1));
        store.release_writer(1);
        assert_eq!(store.in_flight_writer(), None);
    }
}
