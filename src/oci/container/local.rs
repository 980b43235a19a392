//! A local Command Line Interface based OCI runtime implementation. The most commonly known are
//! [runc][0] and [crun][1].
//!
//! [0]: https://github.com/opencontainers/runc
//! [1]: https://github.com/containers/crun

use crate::oci::{
    container::{Container, ContainerState as TraitContainerState, ContainerStats},
    runtime_adapter::{RuntimeAdapter, RuntimeHandle},
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use derive_builder::Builder;
use getset::Getters;
use oci_spec::runtime::{LinuxResources, Spec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{process::Command, signal::unix::SignalKind};

/// A general OCI container implementation: a thin, serializable handle
/// (id + spec) plus the runtime adapter that actually drives the monitor
/// and runtime processes on its behalf. `adapter` is not serialized — on
/// reload from disk a fresh adapter is reattached by the caller before any
/// lifecycle method is used.
#[derive(Debug, Default, Builder, Getters, Serialize, Deserialize)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
pub struct OCIContainer {
    #[get = "pub"]
    /// Unique identifier of the container.
    id: String,

    #[get = "pub"]
    /// OCI Runtime Specification of the container.
    spec: Spec,

    #[serde(skip)]
    #[builder(setter(skip))]
    adapter: Option<Arc<RuntimeAdapter>>,
}

impl OCIContainer {
    /// Attach the [`RuntimeAdapter`] that drives this container's process
    /// lifecycle; required before any [`Container`] trait method is called.
    pub fn attach_adapter(&mut self, adapter: Arc<RuntimeAdapter>) {
        self.adapter = Some(adapter);
    }

    fn adapter(&self) -> Result<&RuntimeAdapter> {
        self.adapter
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("container {} has no attached runtime adapter", self.id))
    }
}

#[async_trait]
impl Container for OCIContainer {
    /// Create a new container, which should be in the `Created` state afterwards.
    /// Bare construction only; use [`OCIContainerBuilder`] plus
    /// [`RuntimeAdapter::create_container`] for the real pipeline (C12
    /// owns the OCI-bundle assembly this requires).
    async fn create() -> Result<Self> {
        bail!("OCIContainer::create requires a bundle; use container::lifecycle::create_container")
    }

    /// Execute the user defined process in a created container.
    async fn start(&mut self) -> Result<()> {
        self.adapter()?.start_container(&self.id).await
    }

    /// Delete any resources held by the container often used with detached container.
    async fn delete(&mut self) -> Result<()> {
        self.adapter()?.delete_container(&self.id).await
    }

    /// Suspend all processes inside the container.
    async fn pause(&mut self) -> Result<()> {
        self.adapter()?.pause_container(&self.id).await
    }

    /// Resumes all processes that have been previously paused.
    async fn resume(&mut self) -> Result<()> {
        self.adapter()?.resume_container(&self.id).await
    }

    /// Send the specified signal to the container's init process.
    async fn kill(&mut self, signal_kind: SignalKind) -> Result<()> {
        self.adapter()?.kill_container(&self.id, signal_kind).await
    }

    /// Update container resource constraints.
    async fn update(&mut self, resources: &LinuxResources) -> Result<()> {
        self.adapter()?.update_container(&self.id, resources).await
    }

    /// Execute the provided process inside the container.
    async fn exec(&self, _command: &Command) -> Result<()> {
        bail!("exec is not implemented by the local OCI container backend")
    }

    /// Retrieve container resource statistics.
    async fn stats(&self) -> Result<ContainerStats> {
        Ok(ContainerStats::default())
    }

    /// Retrieve the state of a container.
    async fn state(&self) -> Result<TraitContainerState> {
        Ok(match self.adapter()?.state(&self.id).await? {
            RuntimeHandle::Created => TraitContainerState::Created,
            RuntimeHandle::Running => TraitContainerState::Started,
            RuntimeHandle::Stopped => TraitContainerState::Killed,
            RuntimeHandle::Removed => TraitContainerState::Killed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_create() -> Result<()> {
        let container = OCIContainerBuilder::default().id("id").build()?;
        assert_eq!(container.id(), "id");
        assert_eq!(container.spec(), &Spec::default());
        Ok(())
    }
}
