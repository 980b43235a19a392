//! A CRI API service implementation.

use crate::{
    bundle::store::BundleStore,
    config::Config,
    cri::api,
    lock_map::RwLockMap,
    namespace::NamespaceManager,
    network::{cni::CNI, Network},
    oci::runtime_adapter::RuntimeAdapter,
    pull_coalescer::PullCoalescer,
    registrar::Registrar,
    resource_store::ResourceStore,
    sandbox::record::SandboxRecord,
    storage::{container_storage::ContainerStorage, default_key_value_storage::DefaultKeyValueStorage},
};
use anyhow::Result;
use derive_builder::Builder;
use log::debug;
use std::{collections::HashMap, fmt::{Debug, Display}, sync::Arc};
use tokio::sync::{broadcast, Mutex as AsyncMutex, RwLock};
use tonic::{Request, Response, Status};

/// How many past container lifecycle events a newly-attached
/// `GetContainerEvents` watcher can miss before it starts receiving live
/// ones; sized generously since each event is a handful of bytes.
pub const EVENTS_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Builder)]
#[builder(pattern = "owned", setter(into))]
/// The service implementation for the CRI API, holding every component
/// (C1-C10) the sandbox and container lifecycle pipelines (C11, C12) drive.
pub struct CRIService {
    /// Storage used by the service; repurposed beyond its original
    /// key-value role to persist each sandbox's CNI result JSON so
    /// `PodSandboxStatus` can still report pod IPs after a daemon restart.
    storage: DefaultKeyValueStorage,

    /// Daemon configuration (paths, cgroup manager, conmon/runtime binaries).
    pub(crate) config: Arc<Config>,

    /// ID/Name Registrar (C1).
    pub(crate) registrar: Arc<Registrar>,

    /// Bundle Store (C2).
    pub(crate) bundle_store: Arc<BundleStore>,

    /// Storage Service (C5) for container records.
    pub(crate) container_storage: Arc<ContainerStorage>,

    /// Resource Store (C6) for in-progress sandbox/container creation.
    pub(crate) resource_store: Arc<ResourceStore>,

    /// Pull Coalescer (C7).
    pub(crate) pull_coalescer: Arc<PullCoalescer>,

    /// Namespace Manager (C8).
    pub(crate) namespace_manager: Arc<NamespaceManager>,

    /// Runtime Adapter (C10), driving conmon/runc.
    pub(crate) runtime_adapter: Arc<RuntimeAdapter>,

    /// Per-sandbox-id lock excluding container creation from pod sandbox
    /// teardown; readers are `CreateContainer` calls, the writer is
    /// `StopPodSandbox`/`RemovePodSandbox`.
    pub(crate) stop_mutex: Arc<RwLockMap<String>>,

    /// In-memory sandbox table (C11's data model).
    pub(crate) sandboxes: Arc<RwLock<HashMap<String, SandboxRecord>>>,

    /// The pod network implementation, shared across sandboxes.
    pub(crate) network: Arc<AsyncMutex<Network<CNI>>>,

    /// Broadcast of container lifecycle events for `GetContainerEvents`.
    pub(crate) events: broadcast::Sender<api::ContainerEventResponse>,
}

impl CRIService {
    /// Debug log a request.
    pub fn debug_request<T>(&self, request: &Request<T>)
    where
        T: Debug,
    {
        debug!("{:?}", request.get_ref());
    }

    /// Debug log a response.
    pub fn debug_response<T>(&self, response: &Result<Response<T>, Status>)
    where
        T: Debug,
    {
        debug!("{:?}", response.as_ref().map(|x| x.get_ref()));
    }

    /// Publish a container lifecycle event; there being no subscribers yet
    /// is not an error, `GetContainerEvents` callers simply miss events
    /// sent before they connected.
    pub(crate) fn publish_event(&self, container_id: &str, event_type: i32) {
        let _ = self.events.send(api::ContainerEventResponse {
            container_id: container_id.to_string(),
            container_event_type: event_type,
            created_at: now_unix_nanos(),
        });
    }
}

/// Current time as CRI's `created_at`/`started_at` fields want it: Unix
/// nanoseconds.
pub(crate) fn now_unix_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Option to Status transformer for less verbose request unpacking.
pub trait OptionStatus<T> {
    /// Maps the self type to an invalid argument status containing the provided `msg`.
    fn ok_or_invalid(self, msg: impl Into<String>) -> Result<T, Status>
    where
        Self: Sized,
    {
        self.ok_or_else(|| Status::invalid_argument(msg))
    }

    /// Transforms the `OptionStatus<T>` into a [`Result<T, E>`], mapping [`Some(v)`] to
    /// [`Ok(v)`] and [`None`] to [`Err(err())`].
    ///
    /// [`Result<T, E>`]: Result
    /// [`Ok(v)`]: Ok
    /// [`Err(err())`]: Err
    /// [`Some(v)`]: Some
    fn ok_or_else<E, F>(self, err: F) -> Result<T, E>
    where
        F: FnOnce() -> E;
}

impl<T> OptionStatus<T> for Option<T> {
    fn ok_or_else<E, F>(self, err: F) -> Result<T, E>
    where
        F: FnOnce() -> E,
    {
        self.ok_or_else(err)
    }
}

/// Result to Status transformer for less verbose request unpacking.
pub trait ResultStatus<T, E>
where
    E: Display,
{
    /// Maps the self type to an internal error status containing the provided `msg`.
    fn map_internal(self, msg: impl Into<String> + Display) -> Result<T, Status>
    where
        Self: Sized,
    {
        self.map_err(|e| Status::internal(format!("{}: {}", msg, e)))
    }

    /// Maps a `ResultStatus<T, E>` to `Result<T, F>` by applying a function to a
    /// contained [`Err`] value, leaving an [`Ok`] value untouched.
    ///
    /// This function can be used to pass through a successful result while handling
    /// an error.
    fn map_err<F, O>(self, op: O) -> Result<T, F>
    where
        O: FnOnce(E) -> F;
}

impl<T, E> ResultStatus<T, E> for Result<T, E>
where
    E: Display,
{
    fn map_err<F, O>(self, op: O) -> Result<T, F>
    where
        O: FnOnce(E) -> F,
    {
        self.map_err(op)
    }
}
