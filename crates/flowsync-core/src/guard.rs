// ── Keyed mutual exclusion ──
//
// One async mutex per key, shared by every caller that holds a handle for
// that key. Entries are reference counted and dropped from the map when the
// last handle goes away, so a churning device population does not grow the
// pool without bound.
//
// The reference count is only ever changed while the map shard for the key
// is write-locked (`entry()` on acquire, `remove_if()` on release). A new
// caller therefore either joins the live entry or, once it has been
// removed, builds a fresh one that nobody else can still be holding.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct GuardEntry {
    lock: Arc<Mutex<()>>,
    refs: AtomicUsize,
}

impl GuardEntry {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            refs: AtomicUsize::new(0),
        }
    }
}

type EntryMap<K> = DashMap<K, Arc<GuardEntry>>;

/// Pool of per-key async locks.
///
/// Cheaply cloneable; clones share the same entries.
pub struct KeyedGuardPool<K: Eq + Hash + Clone> {
    entries: Arc<EntryMap<K>>,
}

impl<K: Eq + Hash + Clone> Clone for KeyedGuardPool<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedGuardPool<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug> fmt::Debug for KeyedGuardPool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedGuardPool")
            .field("live_keys", &self.entries.len())
            .finish()
    }
}

impl<K: Eq + Hash + Clone> KeyedGuardPool<K> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Take a reference on the handle for `key`, creating it if needed.
    ///
    /// Every caller holding a live handle for the same key shares one lock.
    pub fn acquire(&self, key: &K) -> GuardHandle<K> {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(GuardEntry::new()));
        entry.refs.fetch_add(1, Ordering::AcqRel);
        let entry = Arc::clone(entry.value());

        GuardHandle {
            key: key.clone(),
            entry,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Acquire the handle for `key` and wait for its lock.
    pub async fn lock(&self, key: &K) -> KeyGuard<K> {
        let handle = self.acquire(key);
        let permit = handle.lock().await;
        KeyGuard {
            _permit: permit,
            _handle: handle,
        }
    }

    /// Acquire the handle for `key` and take its lock only if it is free.
    pub fn try_lock(&self, key: &K) -> Option<KeyGuard<K>> {
        let handle = self.acquire(key);
        let permit = Arc::clone(&handle.entry.lock).try_lock_owned().ok()?;
        Some(KeyGuard {
            _permit: permit,
            _handle: handle,
        })
    }

    /// Whether some caller currently holds the lock for `key`.
    pub fn is_held(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.lock.try_lock().is_err())
    }

    /// Number of keys with at least one live handle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A counted reference to the lock for one key.
pub struct GuardHandle<K: Eq + Hash + Clone> {
    key: K,
    entry: Arc<GuardEntry>,
    entries: Arc<EntryMap<K>>,
}

impl<K: Eq + Hash + Clone> GuardHandle<K> {
    /// Wait for exclusive access. Released when the returned guard drops.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.entry.lock).lock_owned().await
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Whether two handles share the same underlying lock.
    pub fn same_lock(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl<K: Eq + Hash + Clone> Drop for GuardHandle<K> {
    fn drop(&mut self) {
        let entry = &self.entry;
        self.entries.remove_if(&self.key, |_, live| {
            Arc::ptr_eq(live, entry) && live.refs.fetch_sub(1, Ordering::AcqRel) == 1
        });
    }
}

/// Held lock plus the handle that keeps its pool entry alive.
///
/// Field order matters: the permit is released before the handle reference.
pub struct KeyGuard<K: Eq + Hash + Clone> {
    _permit: OwnedMutexGuard<()>,
    _handle: GuardHandle<K>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn concurrent_holders_share_one_handle() {
        let pool: KeyedGuardPool<String> = KeyedGuardPool::new();
        let a = pool.acquire(&"openflow:1".to_owned());
        let b = pool.acquire(&"openflow:1".to_owned());
        let other = pool.acquire(&"openflow:2".to_owned());

        assert!(a.same_lock(&b));
        assert!(!a.same_lock(&other));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn entry_reclaimed_after_last_handle_drops() {
        let pool: KeyedGuardPool<u32> = KeyedGuardPool::new();
        let a = pool.acquire(&7);
        let b = pool.acquire(&7);
        drop(a);
        assert_eq!(pool.len(), 1);
        drop(b);
        assert!(pool.is_empty());

        // A later caller gets a freshly built handle.
        let c = pool.acquire(&7);
        let d = pool.acquire(&7);
        assert!(c.same_lock(&d));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn is_held_tracks_lock_not_handle() {
        let pool: KeyedGuardPool<u32> = KeyedGuardPool::new();
        let handle = pool.acquire(&1);
        assert!(!pool.is_held(&1));

        let permit = handle.lock().await;
        assert!(pool.is_held(&1));
        assert!(pool.try_lock(&1).is_none());

        drop(permit);
        assert!(!pool.is_held(&1));
        assert!(pool.try_lock(&1).is_some());
    }

    #[tokio::test]
    async fn key_guard_releases_on_drop() {
        let pool: KeyedGuardPool<u32> = KeyedGuardPool::new();
        {
            let _guard = pool.lock(&3).await;
            assert!(pool.is_held(&3));
        }
        assert!(!pool.is_held(&3));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn second_locker_waits_for_release() {
        let pool: KeyedGuardPool<u32> = KeyedGuardPool::new();
        let first = pool.lock(&5).await;

        let mut waiter = tokio_test::task::spawn(pool.lock(&5));
        assert!(waiter.poll().is_pending());

        drop(first);
        let second = waiter.poll();
        assert!(second.is_ready());
        assert!(pool.is_held(&5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bursts_never_lose_or_duplicate_critical_sections() {
        const WORKERS: usize = 8;
        const BURSTS: usize = 25;
        const PER_BURST: usize = 4;

        let pool: KeyedGuardPool<&'static str> = KeyedGuardPool::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..BURSTS {
            let mut tasks = Vec::new();
            for _ in 0..WORKERS {
                let pool = pool.clone();
                let counter = Arc::clone(&counter);
                tasks.push(tokio::spawn(async move {
                    for _ in 0..PER_BURST {
                        let _guard = pool.lock(&"openflow:1").await;
                        // Non-atomic read-modify-write: only correct under exclusion.
                        let seen = counter.load(Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        counter.store(seen + 1, Ordering::SeqCst);
                    }
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }
            // Let the pool go idle between bursts so entries get rebuilt.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(counter.load(Ordering::SeqCst), WORKERS * BURSTS * PER_BURST);
        assert!(pool.is_empty());
    }
}
