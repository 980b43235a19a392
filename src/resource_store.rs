//! Resource Store: holds in-progress sandbox/container pipelines so a kubelet
//! retry after a client-side timeout is idempotent.

use crate::cleanup::Cleanup;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{watch, RwLock};

/// How long `Put` holds a resource waiting for a caller to come back and
/// collect it.
pub const RESOURCE_CREATION_WAIT_TIME: Duration = Duration::from_secs(4 * 60);

/// The outcome of a checkpointed pipeline: either the produced id, or the
/// pipeline's final error rendered as a string (errors aren't `Clone`, and
/// multiple watchers may need to observe the same outcome).
#[derive(Clone, Debug)]
pub enum ResourceOutcome {
    Ready(String),
    Failed(String),
}

struct InProgressResource {
    stage: RwLock<String>,
    cleanup: tokio::sync::Mutex<Option<Cleanup>>,
    sender: watch::Sender<Option<ResourceOutcome>>,
    receiver: watch::Receiver<Option<ResourceOutcome>>,
}

/// Holds pipelines that have outlived the client's own deadline.
#[derive(Default)]
pub struct ResourceStore {
    resources: RwLock<HashMap<String, Arc<InProgressResource>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the human-readable stage for an in-progress resource. A no-op
    /// if `name` isn't tracked (the pipeline hasn't checkpointed yet).
    pub async fn set_stage_for_resource(&self, name: &str, stage: impl Into<String>) {
        if let Some(r) = self.resources.read().await.get(name) {
            *r.stage.write().await = stage.into();
        }
    }

    /// Transfer ownership of an in-flight resource (and its accumulated
    /// cleanup list) into the store. Returns a receiver that resolves once
    /// the pipeline finishes, for callers that want to wait inline.
    pub async fn put(
        &self,
        name: &str,
        stage: impl Into<String>,
        cleanup: Cleanup,
    ) -> watch::Receiver<Option<ResourceOutcome>> {
        let (sender, receiver) = watch::channel(None);
        let resource = Arc::new(InProgressResource {
            stage: RwLock::new(stage.into()),
            cleanup: tokio::sync::Mutex::new(Some(cleanup)),
            sender,
            receiver: receiver.clone(),
        });
        self.resources.write().await.insert(name.to_string(), resource);
        receiver
    }

    /// Record the pipeline's final outcome without removing the entry; the
    /// entry is only removed when a subsequent caller observes it via
    /// [`ResourceStore::get`] or [`ResourceStore::delete`].
    pub async fn resolve(&self, name: &str, outcome: ResourceOutcome) {
        if let Some(r) = self.resources.read().await.get(name) {
            let _ = r.sender.send(Some(outcome));
        }
    }

    /// Returns the resolved id for `name`, if the pipeline has finished
    /// successfully. Implements a two-step hand-off: the
    /// first caller to observe a resolved outcome removes the entry and
    /// returns the id; later callers see nothing left to retrieve.
    pub async fn get(&self, name: &str) -> Option<String> {
        let maybe = self.resources.read().await.get(name).cloned();
        let resource = maybe?;
        let outcome = resource.receiver.borrow().clone();
        match outcome {
            Some(ResourceOutcome::Ready(id)) => {
                self.resources.write().await.remove(name);
                Some(id)
            }
            _ => None,
        }
    }

    /// A receiver that resolves (or is already resolved) when the named
    /// pipeline finishes, plus its current stage.
    pub async fn watcher_for_resource(
        &self,
        name: &str,
    ) -> Option<(watch::Receiver<Option<ResourceOutcome>>, String)> {
        let resources = self.resources.read().await;
        let r = resources.get(name)?;
        Some((r.receiver.clone(), r.stage.read().await.clone()))
    }

    /// Discard a tracked resource and its cleanup list without running it
    /// (the pipeline succeeded and the caller already has the result).
    pub async fn delete(&self, name: &str) {
        self.resources.write().await.remove(name);
    }

    /// Remove a tracked resource and return its cleanup list so the caller
    /// can run it (the pipeline failed definitively after being checkpointed).
    pub async fn take_cleanup(&self, name: &str) -> Option<Cleanup> {
        let resource = self.resources.write().await.remove(name)?;
        resource.cleanup.lock().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn put_then_get_before_resolve_returns_none() {
        let store = ResourceStore::new();
        store.put("c1", "creating", Cleanup::new()).await;
        assert!(store.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn put_resolve_then_get_returns_id_once() {
        let store = ResourceStore::new();
        store.put("c1", "creating", Cleanup::new()).await;
        store.resolve("c1", ResourceOutcome::Ready("id-1".into())).await;

        assert_eq!(store.get("c1").await, Some("id-1".into()));
        // second retrieval: entry already removed.
        assert_eq!(store.get("c1").await, None);
    }

    #[tokio::test]
    async fn watcher_observes_resolution() {
        let store = ResourceStore::new();
        let mut rx = store.put("c1", "creating", Cleanup::new()).await;
        store.resolve("c1", ResourceOutcome::Ready("id-1".into())).await;

        timeout(StdDuration::from_millis(100), rx.changed())
            .await
            .unwrap()
            .unwrap();
        match rx.borrow().clone() {
            Some(ResourceOutcome::Ready(id)) => assert_eq!(id, "id-1"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stage_updates_are_observable() {
        let store = ResourceStore::new();
        store.put("c1", "creating", Cleanup::new()).await;
        store.set_stage_for_resource("c1", "starting runtime").await;
        let (_, stage) = store.watcher_for_resource("c1").await.unwrap();
        assert_eq!(stage, "starting runtime");
    }

    #[tokio::test]
    async fn take_cleanup_removes_entry() {
        let store = ResourceStore::new();
        let mut cleanup = Cleanup::new();
        cleanup.push("undo thing", || Ok(()));
        store.put("c1", "creating", cleanup).await;

        let taken = store.take_cleanup("c1").await.unwrap();
        assert_eq!(taken.len(), 1);
        assert!(store.watcher_for_resource("c1").await.is_none());
    }
}
