use std::{collections::HashMap, hash::Hash, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, TryLockError};

#[derive(Default)]
pub struct LockMap<K: Hash + Eq> {
    inner: std::sync::Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

pub struct LockMapGuard<'m, K: Hash + Eq> {
    map: &'m LockMap<K>,
    key: K,
    _guard: OwnedMutexGuard<()>,
}
impl<K: Hash + Eq> Drop for LockMapGuard<'_, K> {
    fn drop(&mut self) {
        self.map
            .inner
            .lock()
            .expect("lock map guard")
            .remove(&self.key);
    }
}

impl<K: Hash + Eq + Clone> LockMap<K> {
    fn mutex_by_key(&self, key: K) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("lock map guard");
        let mutex = map
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex
    }
    pub async fn lock(&self, key: K) -> LockMapGuard<'_, K> {
        let guard = self.mutex_by_key(key.clone()).lock_owned().await;
        LockMapGuard {
            map: self,
            key,
            _guard: guard,
        }
    }
    pub fn try_lock(&self, key: K) -> Result<LockMapGuard<'_, K>, TryLockError> {
        let guard = self.mutex_by_key(key.clone()).try_lock_owned()?;
        Ok(LockMapGuard {
            map: self,
            key,
            _guard: guard,
        })
    }
}

/// Same shape as [`LockMap`], but a per-key reader/writer lock rather than a
/// plain mutex: many readers (container create/start/stop/remove) run
/// concurrently against one sandbox id, while a writer (stop pod sandbox)
/// excludes all of them.
#[derive(Default)]
pub struct RwLockMap<K: Hash + Eq> {
    inner: std::sync::Mutex<HashMap<K, Arc<RwLock<()>>>>,
}

pub struct RwLockMapReadGuard<'m, K: Hash + Eq> {
    map: &'m RwLockMap<K>,
    key: K,
    _guard: OwnedRwLockReadGuard<()>,
}
impl<K: Hash + Eq> Drop for RwLockMapReadGuard<'_, K> {
    fn drop(&mut self) {
        self.map.forget_if_unused(&self.key);
    }
}

pub struct RwLockMapWriteGuard<'m, K: Hash + Eq> {
    map: &'m RwLockMap<K>,
    key: K,
    _guard: OwnedRwLockWriteGuard<()>,
}
impl<K: Hash + Eq> Drop for RwLockMapWriteGuard<'_, K> {
    fn drop(&mut self) {
        self.map.forget_if_unused(&self.key);
    }
}

impl<K: Hash + Eq + Clone> RwLockMap<K> {
    fn lock_by_key(&self, key: K) -> Arc<RwLock<()>> {
        let mut map = self.inner.lock().expect("rw lock map guard");
        map.entry(key).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    /// Drop the per-key lock from the map once nothing holds a reference to
    /// it any more, so the map doesn't grow unbounded across a daemon's
    /// lifetime. A benign race with a new locker arriving just loses the
    /// removal (the entry gets recreated), never correctness.
    fn forget_if_unused(&self, key: &K) {
        let mut map = self.inner.lock().expect("rw lock map guard");
        if let Some(lock) = map.get(key) {
            if Arc::strong_count(lock) == 1 {
                map.remove(key);
            }
        }
    }

    pub async fn read(&self, key: K) -> RwLockMapReadGuard<'_, K> {
        let guard = self.lock_by_key(key.clone()).read_owned().await;
        RwLockMapReadGuard { map: self, key, _guard: guard }
    }

    pub async fn write(&self, key: K) -> RwLockMapWriteGuard<'_, K> {
        let guard = self.lock_by_key(key.clone()).write_owned().await;
        RwLockMapWriteGuard { map: self, key, _guard: guard }
    }
}
