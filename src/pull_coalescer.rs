//! Pull Coalescer: single-flight deduplication keyed on
//! (image-name, sandbox-cgroup, namespace) so that concurrent requests for
//! the same resource trigger exactly one underlying pull/assembly.
//! Generalized from the per-key exclusion idea in [`crate::lock_map`],
//! but single-flight rather than mutual exclusion: later arrivals reuse the
//! first arrival's result instead of re-running the operation.

use futures::FutureExt;
use std::{collections::HashMap, fmt::Debug, future::Future, panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::Notify;

struct Slot<V> {
    notify: Arc<Notify>,
    result: std::sync::Mutex<Option<Result<V, String>>>,
}

/// A keyed single-flight map. `K` identifies the operation; `V` is its
/// cloneable result.
pub struct CoalesceMap<K, V> {
    inflight: AsyncMutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> Default for CoalesceMap<K, V> {
    fn default() -> Self {
        Self {
            inflight: AsyncMutex::new(HashMap::new()),
        }
    }
}

impl<K, V> CoalesceMap<K, V>
where
    K: std::hash::Hash + Eq + Clone + Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` for `key`, or join an already-running call for the same
    /// key and return its result once it completes. A panic inside `fut` is
    /// caught and turned into an `Err` so waiters never hang.
    pub async fn coalesce<F>(&self, key: K, fut: F) -> Result<V, String>
    where
        F: Future<Output = Result<V, String>>,
    {
        // Fast path / install: decide under the map's own lock whether we're
        // the leader for this key (held only while mutating the map, never
        // across the operation itself, not across the pull itself).
        let (slot, is_leader) = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(&key) {
                (existing.clone(), false)
            } else {
                let slot = Arc::new(Slot {
                    notify: Arc::new(Notify::new()),
                    result: std::sync::Mutex::new(None),
                });
                inflight.insert(key.clone(), slot.clone());
                (slot, true)
            }
        };

        if is_leader {
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(format!("pull operation for {:?} panicked", key)),
            };
            *slot.result.lock().expect("coalesce slot poisoned") = Some(outcome.clone());
            slot.notify.notify_waiters();
            self.inflight.lock().await.remove(&key);
            outcome
        } else {
            // Register for notification before checking the result, and
            // `enable()` it so a leader that finishes between our map lookup
            // and this await can't notify into a void: without this, a fast
            // leader could call `notify_waiters()` before we start waiting
            // and we'd never wake up.
            let notified = slot.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = slot.result.lock().expect("coalesce slot poisoned").clone() {
                return result;
            }

            notified.await;
            slot.result
                .lock()
                .expect("coalesce slot poisoned")
                .clone()
                .unwrap_or_else(|| Err(format!("pull operation for {:?} lost its result", key)))
        }
    }
}

/// Fingerprint identifying a single-flight pull: (image reference,
/// sandbox cgroup, namespace).
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct PullKey {
    pub image: String,
    pub sandbox_cgroup: String,
    pub namespace: String,
}

/// Single-flight wrapper around image bundle assembly.
pub type PullCoalescer = CoalesceMap<PullKey, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(image: &str) -> PullKey {
        PullKey {
            image: image.into(),
            sandbox_cgroup: "cg".into(),
            namespace: "default".into(),
        }
    }

    #[tokio::test]
    async fn concurrent_pulls_for_same_key_run_once() {
        let coalescer = Arc::new(PullCoalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .coalesce(key("alpine:latest"), async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("bundle-1".to_string())
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), Ok("bundle-1".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_run_independently() {
        let coalescer = PullCoalescer::new();
        let a = coalescer.coalesce(key("a"), async { Ok("a-bundle".to_string()) });
        let b = coalescer.coalesce(key("b"), async { Ok("b-bundle".to_string()) });
        assert_eq!(a.await, Ok("a-bundle".to_string()));
        assert_eq!(b.await, Ok("b-bundle".to_string()));
    }

    #[tokio::test]
    async fn panic_in_leader_resolves_waiters_with_error() {
        let coalescer = Arc::new(PullCoalescer::new());
        let leader = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move {
                coalescer
                    .coalesce(key("boom"), async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        panic!("pull exploded")
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(2)).await;
        let follower = coalescer
            .coalesce(key("boom"), async { Ok("unused".to_string()) })
            .await;

        assert!(leader.await.unwrap().is_err());
        assert!(follower.is_err());
    }

    #[tokio::test]
    async fn key_is_removed_after_completion_so_a_later_call_reruns() {
        let coalescer = PullCoalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        coalescer
            .coalesce(key("alpine"), async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok("first".to_string())
            })
            .await
            .unwrap();

        let c2 = calls.clone();
        coalescer
            .coalesce(key("alpine"), async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok("second".to_string())
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
