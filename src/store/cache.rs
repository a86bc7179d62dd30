use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{Store, StoreError};
use crate::observability::{log_debug, log_warn};

static GLOBAL: Lazy<Arc<StoreCache>> = Lazy::new(|| Arc::new(StoreCache::new()));

struct CacheEntry {
    store: Arc<Store>,
    refs: usize,
}

/// Registry of open stores, one per backing path.
///
/// Opening a path that is already cached hands out the same [`Store`] and
/// bumps its reference count; the store is closed and evicted when the count
/// drops back to zero. The whole map sits behind a single mutex: opens and
/// closes are rare next to row traffic.
///
/// [`StoreCache::global`] is empty at process start and only ever changes
/// through explicit `open`/`close` calls. Independent caches can be built
/// with [`StoreCache::new`], e.g. to isolate tests.
pub struct StoreCache {
    stores: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl Default for StoreCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreCache {
    pub fn new() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide cache.
    pub fn global() -> Arc<StoreCache> {
        GLOBAL.clone()
    }

    pub fn open(&self, path: impl AsRef<Path>, read_only: bool) -> Result<Arc<Store>, StoreError> {
        self.open_with_capacity(path, read_only, None)
    }

    /// Like [`StoreCache::open`], passing a page cache size to newly opened
    /// stores. Ignored when the store is already cached.
    ///
    /// A cached store is only shared with callers asking for the same
    /// `read_only` mode; any other request fails with
    /// [`StoreError::ModeMismatch`].
    pub fn open_with_capacity(
        &self,
        path: impl AsRef<Path>,
        read_only: bool,
        cache_capacity: Option<u64>,
    ) -> Result<Arc<Store>, StoreError> {
        let path = normalize(path.as_ref());
        let mut stores = self.stores.lock();
        if let Some(entry) = stores.get_mut(&path) {
            if entry.store.is_read_only() != read_only {
                return Err(StoreError::ModeMismatch {
                    path,
                    open_read_only: entry.store.is_read_only(),
                });
            }
            entry.refs += 1;
            log_debug!(
                component = "store",
                event = "store_shared",
                path = %path.display(),
                refs = entry.refs,
            );
            return Ok(entry.store.clone());
        }
        let store = Arc::new(Store::open(&path, read_only, cache_capacity)?);
        stores.insert(
            path,
            CacheEntry {
                store: store.clone(),
                refs: 1,
            },
        );
        Ok(store)
    }

    /// Release one reference to `store`. Returns `true` when this was the last
    /// reference and the store has been closed.
    pub fn close(&self, store: &Arc<Store>) -> Result<bool, StoreError> {
        let path = normalize(store.path());
        let mut stores = self.stores.lock();
        let Some(entry) = stores.get_mut(&path) else {
            log_warn!(
                component = "store",
                event = "close_untracked_store",
                path = %path.display(),
            );
            return Ok(false);
        };
        if !Arc::ptr_eq(&entry.store, store) {
            log_warn!(
                component = "store",
                event = "close_foreign_store",
                path = %path.display(),
            );
            return Ok(false);
        }
        entry.refs -= 1;
        if entry.refs > 0 {
            return Ok(false);
        }
        if let Some(entry) = stores.remove(&path) {
            entry.store.close()?;
        }
        Ok(true)
    }

    /// Current reference count for `path`, zero when not cached.
    pub fn ref_count(&self, path: impl AsRef<Path>) -> usize {
        let path = normalize(path.as_ref());
        self.stores.lock().get(&path).map_or(0, |entry| entry.refs)
    }

    pub fn is_cached(&self, path: impl AsRef<Path>) -> bool {
        self.ref_count(path) > 0
    }

    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
