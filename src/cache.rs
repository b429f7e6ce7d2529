//! Bounded per-file cache of sequenced datasets for analytics requests.
//!
//! Each file gets its own slot guarded by a mutex, so concurrent requests for
//! one file load it once while requests for other files proceed
//! independently. A slot is reloaded when the file's length or modification
//! time no longer match what was loaded.

use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use lru::LruCache;

use crate::error::{Error, Result};
use crate::sequence::Sequenced;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::Io(err),
        })?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

struct Loaded {
    fingerprint: Fingerprint,
    data: Arc<Sequenced>,
}

#[derive(Default)]
struct Slot {
    state: Mutex<Option<Loaded>>,
}

pub struct DatasetCache {
    slots: Mutex<LruCache<PathBuf, Arc<Slot>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl fmt::Debug for DatasetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetCache")
            .field("entries", &lock(&self.slots).len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl DatasetCache {
    /// Cache holding at most `capacity` datasets (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached dataset for `path`, calling `load` when the file is not cached
    /// or changed on disk since it was loaded.
    pub fn get_or_load<F>(&self, path: &Path, load: F) -> Result<Arc<Sequenced>>
    where
        F: FnOnce(&Path) -> Result<Sequenced>,
    {
        let fingerprint = Fingerprint::of(path)?;
        let slot = {
            let mut slots = lock(&self.slots);
            match slots.get(path) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Arc::new(Slot::default());
                    slots.put(path.to_path_buf(), Arc::clone(&slot));
                    slot
                }
            }
        };

        let mut state = lock(&slot.state);
        if let Some(loaded) = state.as_ref() {
            if loaded.fingerprint == fingerprint {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&loaded.data));
            }
            log::info!("{} changed on disk; reloading", path.display());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let data = Arc::new(load(path)?);
        *state = Some(Loaded {
            fingerprint,
            data: Arc::clone(&data),
        });
        Ok(data)
    }

    /// Drop the cached dataset for `path`, if any.
    pub fn invalidate(&self, path: &Path) {
        lock(&self.slots).pop(path);
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
