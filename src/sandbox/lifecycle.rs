//! Sandbox Lifecycle (C11): `RunPodSandbox`/`StopPodSandbox`/
//! `RemovePodSandbox`, each a staged, fully-reversible pipeline built on
//! [`crate::cleanup::Cleanup`] the same way the teacher's CNI
//! initialization builds up state incrementally and tears it back down on
//! error, generalized here to a single LIFO undo stack per call instead of
//! one watcher thread.

use crate::{
    bundle::{assemble, overlay::OverlayComposer},
    cleanup::Cleanup,
    container::{ContainerRecordBuilder, ContainerState},
    cri::api::{self, NamespaceMode, PodSandboxConfig},
    error::CriError,
    namespace::{NamespaceConfig, NamespaceType},
    oci_spec_builder::{self, SpecInputs},
    resource_store::ResourceOutcome,
    sandbox::record::{SandboxRecordBuilder, SandboxState},
    storage::container_storage::merged_root_path,
};
use anyhow::Context;
use log::{info, warn};
use oci_spec::runtime::{LinuxNamespaceType, Mount as OCIMount, MountBuilder};
use std::{collections::HashMap, path::Path, time::Duration};
use uuid::Uuid;

use super::super::cri::cri_service::{now_unix_nanos, CRIService};

fn namespace_type_to_oci(typ: NamespaceType) -> LinuxNamespaceType {
    match typ {
        NamespaceType::Net => LinuxNamespaceType::Network,
        NamespaceType::Ipc => LinuxNamespaceType::Ipc,
        NamespaceType::Uts => LinuxNamespaceType::Uts,
        NamespaceType::Pid => LinuxNamespaceType::Pid,
    }
}

/// Pinned namespace paths for a sandbox, keyed for [`crate::oci_spec_builder`].
pub fn pinned_namespaces(namespaces: &[crate::namespace::Namespace]) -> crate::oci_spec_builder::namespaces::PinnedNamespaces {
    namespaces
        .iter()
        .map(|ns| (namespace_type_to_oci(ns.typ), ns.path.clone()))
        .collect()
}

impl CRIService {
    /// Reserve, pin, and network-attach a new pod sandbox. Idempotent: a
    /// retried call for the same pod (same namespace/name/attempt) either
    /// returns the id of the sandbox already created, waits for one still
    /// in progress, or surfaces the prior attempt's failure.
    pub async fn run_pod_sandbox(&self, config: &PodSandboxConfig, _runtime_handler: &str) -> Result<String, CriError> {
        let metadata = config
            .metadata
            .as_ref()
            .ok_or_else(|| CriError::Validation("pod sandbox config missing metadata".into()))?;
        if metadata.name.is_empty() || metadata.uid.is_empty() || metadata.namespace.is_empty() {
            return Err(CriError::Validation("pod sandbox metadata must set name, uid and namespace".into()));
        }

        let name_key = format!("{}/{}/{}", metadata.namespace, metadata.name, metadata.attempt);

        match self.registrar.lookup_id_by_name(&name_key) {
            Ok(existing_id) => return self.await_in_progress_sandbox(&existing_id).await,
            Err(_) => {}
        }

        let id = Uuid::new_v4().to_string();
        self.registrar
            .reserve_name(&name_key, &id)
            .map_err(|e| CriError::NameCollision(e.to_string()))?;
        self.registrar.index_add(&id);

        let mut cleanup = Cleanup::new();
        {
            let registrar = self.registrar.clone();
            let name_key = name_key.clone();
            let id = id.clone();
            cleanup.push("release reserved name", move || {
                registrar.release_name(&name_key);
                registrar.index_delete(&id);
                Ok(())
            });
        }
        // `ResourceStore` here only arbitrates *duplicate* RunPodSandbox
        // calls for the same pod while this one is in flight; the actual
        // undo stack stays local to this task and runs directly below,
        // since nothing hands this pipeline off across a cancellation
        // boundary the way a kubelet-timeout retry would need.
        let _rx = self.resource_store.put(&id, "reserved", Cleanup::new()).await;

        match self.run_pod_sandbox_pipeline(&id, config, metadata, cleanup).await {
            Ok((record, cleanup)) => {
                drop(cleanup);
                self.sandboxes.write().await.insert(id.clone(), record);
                self.resource_store.resolve(&id, ResourceOutcome::Ready(id.clone())).await;
                self.resource_store.delete(&id).await;
                info!("pod sandbox {id} ready");
                Ok(id)
            }
            Err((e, cleanup)) => {
                let msg = crate::error::chain(anyhow::anyhow!(e.to_string()));
                self.resource_store.resolve(&id, ResourceOutcome::Failed(msg)).await;
                self.resource_store.delete(&id).await;
                cleanup.run();
                Err(e)
            }
        }
    }

    async fn await_in_progress_sandbox(&self, id: &str) -> Result<String, CriError> {
        if let Some(existing) = self.resource_store.get(id).await {
            return Ok(existing);
        }
        if let Some((mut rx, _stage)) = self.resource_store.watcher_for_resource(id).await {
            let changed = tokio::time::timeout(Duration::from_secs(5), rx.changed()).await;
            if changed.is_ok() {
                match rx.borrow().clone() {
                    Some(ResourceOutcome::Ready(id)) => return Ok(id),
                    Some(ResourceOutcome::Failed(msg)) => return Err(CriError::PipelineFailed(anyhow::anyhow!(msg))),
                    None => {}
                }
            }
        }
        if let Some(record) = self.sandboxes.read().await.get(id) {
            return Ok(record.id().clone());
        }
        Err(CriError::Cancelled("pod sandbox creation still in progress, retry".into()))
    }

    async fn run_pod_sandbox_pipeline(
        &self,
        id: &str,
        config: &PodSandboxConfig,
        metadata: &api::PodSandboxMetadata,
        mut cleanup: Cleanup,
    ) -> Result<(crate::sandbox::record::SandboxRecord, Cleanup), (CriError, Cleanup)> {
        let linux = config.linux.clone().unwrap_or_default();
        let security_context = linux.security_context.clone().unwrap_or_default();
        let namespace_options = security_context.namespace_options.clone().unwrap_or_default();

        let host_network = namespace_options.network() == NamespaceMode::Node;
        let host_ipc = namespace_options.ipc() == NamespaceMode::Node;

        let ns_cfg = NamespaceConfig {
            net: namespace_options.network() == NamespaceMode::Pod,
            ipc: namespace_options.ipc() == NamespaceMode::Pod,
            pid: namespace_options.pid() == NamespaceMode::Pod,
            uts: true,
        };

        let run_dir = self.config.run_root_path().join("sandboxes").join(id);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("create sandbox run dir {}", run_dir.display()))
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(&mut cleanup)))?;
        {
            let run_dir = run_dir.clone();
            cleanup.push("remove sandbox run dir", move || {
                if run_dir.exists() {
                    std::fs::remove_dir_all(&run_dir)?;
                }
                Ok(())
            });
        }

        let namespaces = self
            .namespace_manager
            .new_pod_namespaces(id, ns_cfg)
            .await
            .map_err(|e| CriError::RuntimeFailure(e.to_string()))
            .map_err(|e| (e, cleanup_taken(&mut cleanup)))?;
        {
            let namespace_manager = self.namespace_manager.clone();
            let namespaces = namespaces.clone();
            cleanup.push("unpin sandbox namespaces", move || {
                namespace_manager.remove(&namespaces).map_err(Into::into)
            });
        }

        let cgroup_parent = if linux.cgroup_parent.is_empty() {
            format!("/containrs/{id}")
        } else {
            linux.cgroup_parent.clone()
        };

        let record = SandboxRecordBuilder::default()
            .id(id.to_string())
            .name(metadata.name.clone())
            .uid(metadata.uid.clone())
            .namespace(metadata.namespace.clone())
            .attempt(metadata.attempt)
            .created_at(now_unix_nanos())
            .state(SandboxState::Ready)
            .cgroup_parent(cgroup_parent)
            .run_dir(run_dir)
            .namespace_options(namespace_options)
            .host_network(host_network)
            .host_ipc(host_ipc)
            .pod_sysctls(linux.sysctls.clone())
            .labels(config.labels.clone())
            .annotations(config.annotations.clone())
            .namespaces(namespaces)
            .build()
            .context("build sandbox record")
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(&mut cleanup)))?;

        // CNI plugin invocation itself is out of scope for this core (see
        // `network::cni::CNI`'s no-op start/stop); the network wrapper is
        // still driven so a future implementation only needs to fill in
        // `PodNetwork::start` without touching the sandbox pipeline.
        let mut network = self.network.lock().await;
        if !host_network {
            let sandbox_data = crate::sandbox::SandboxDataBuilder::default()
                .id(id.to_string())
                .name(metadata.name.clone())
                .namespace(metadata.namespace.clone())
                .attempt(metadata.attempt)
                .hostname(config.hostname.clone())
                .log_directory(std::path::PathBuf::from(config.log_directory.clone()))
                .annotations(config.annotations.clone())
                .build()
                .context("build sandbox data for network start")
                .map_err(CriError::Internal)
                .map_err(|e| (e, cleanup_taken(&mut cleanup)))?;
            if let Err(e) = network.start(&sandbox_data).await {
                return Err((CriError::RuntimeFailure(format!("start pod network: {e:#}")), cleanup_taken(&mut cleanup)));
            }
            cleanup.push("network stop (best effort, no-op for CNI today)", || Ok(()));
        }
        drop(network);

        self.create_infra_container(id, config, metadata, &record, &mut cleanup).await?;

        cleanup.run_into_noop();
        Ok((record, cleanup))
    }

    /// Build and create the sandbox's infra container: the long-lived
    /// process that holds the pod's namespaces open. Stored as a plain
    /// `ContainerRecord` with `id == pod_id`, which is all `stop_pod_sandbox`/
    /// `remove_pod_sandbox` need to discover and tear it down alongside the
    /// pod's other containers.
    async fn create_infra_container(
        &self,
        id: &str,
        config: &PodSandboxConfig,
        metadata: &api::PodSandboxMetadata,
        sandbox: &crate::sandbox::record::SandboxRecord,
        cleanup: &mut Cleanup,
    ) -> Result<(), (CriError, Cleanup)> {
        let image_volumes_root = self.config.storage_path().join("image-volumes");
        let ctx = crate::solver::DeploymentContext::new();
        let pause_image_id = assemble::ensure_image(
            &self.bundle_store,
            &self.pull_coalescer,
            &image_volumes_root,
            self.config.pause_image(),
            sandbox.cgroup_parent(),
            sandbox.namespace(),
            &ctx,
        )
        .await
        .map_err(|e| (CriError::RegistryUnavailable(e), cleanup_taken(cleanup)))?;

        let bundle = self
            .bundle_store
            .get_by_id(&pause_image_id)
            .await
            .context("look up infra bundle")
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(cleanup)))?
            .ok_or_else(|| (CriError::NotFound(format!("bundle {pause_image_id}")), cleanup_taken(cleanup)))?;

        let (work_dir, run_dir) = self
            .container_storage
            .allocate(id)
            .await
            .context("allocate infra container storage")
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(cleanup)))?;
        {
            let work_dir = work_dir.clone();
            let run_dir = run_dir.clone();
            cleanup.push("remove infra container storage dirs", move || {
                for dir in [&work_dir, &run_dir] {
                    if dir.exists() {
                        std::fs::remove_dir_all(dir)?;
                    }
                }
                Ok(())
            });
        }

        let merged_dir = merged_root_path(&work_dir);
        let overlay = OverlayComposer::compose(bundle.layer_paths(), &work_dir)
            .context("compose infra overlay")
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(cleanup)))?;
        {
            let merged_dir = overlay.merged_dir.clone();
            cleanup.push("unmount infra overlay", move || OverlayComposer::remove(&merged_dir));
        }

        let shm = shm_mount(self.config.shm_size_bytes())
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(cleanup)))?;
        let hostname = hostname_mount(&run_dir, &config.hostname)
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(cleanup)))?;
        let extra_mounts = [shm, hostname];

        let pinned = pinned_namespaces(sandbox.namespaces());
        let no_env: HashMap<String, String> = HashMap::new();
        let annotations = config.annotations.clone();

        let inputs = SpecInputs {
            container_id: id,
            sandbox_id: id,
            rootfs: &merged_dir,
            readonly_rootfs: false,
            command: self.config.pause_command(),
            args: &[],
            cwd: "/",
            env: &no_env,
            hostname: config.hostname.as_str(),
            cri_mounts: &[],
            security_context: None,
            resources: None,
            namespace_options: Some(sandbox.namespace_options()),
            pinned_namespaces: &pinned,
            cgroup_manager: self.config.cgroup_manager(),
            cgroup_parent: sandbox.cgroup_parent(),
            run_dir: &run_dir,
            daemon_default_sysctls: self.config.default_sysctls(),
            pod_sysctls: sandbox.pod_sysctls(),
            host_network: sandbox.host_network(),
            host_ipc: sandbox.host_ipc(),
            timezone: self.config.timezone(),
            annotations: &annotations,
            storage_root: self.config.storage_path(),
            groups_policy: self.config.supplemental_groups_policy(),
            extra_mounts: &extra_mounts,
        };
        let spec = oci_spec_builder::build(&inputs)
            .context("build infra container oci spec")
            .map_err(CriError::Internal)
            .map_err(|e| (e, cleanup_taken(cleanup)))?;

        for config_path in [work_dir.join("config.json"), run_dir.join("config.json")] {
            spec.save(&config_path)
                .with_context(|| format!("write {}", config_path.display()))
                .map_err(CriError::Internal)
                .map_err(|e| (e, cleanup_taken(cleanup)))?;
        }

        let log_path = run_dir.join(format!("{id}.log"));
        self.runtime_adapter
            .create_container(id, &work_dir, &log_path)
            .await
            .map_err(|e| CriError::RuntimeFailure(e.to_string()))
            .map_err(|e| (e, cleanup_taken(cleanup)))?;

        // From here on the runtime already knows about the infra container,
        // so a failure needs an explicit (not `Cleanup`-deferred, since
        // deleting it is itself async) best-effort teardown before
        // unwinding the rest.
        if let Err(e) = self.runtime_adapter.start_container(id).await {
            let _ = self.runtime_adapter.delete_container(id).await;
            return Err((CriError::RuntimeFailure(e.to_string()), cleanup_taken(cleanup)));
        }

        let record = match ContainerRecordBuilder::default()
            .id(id.to_string())
            .name(format!("k8s_POD_{}_{}_{}_{}", metadata.name, metadata.namespace, metadata.uid, metadata.attempt))
            .metadata_name("POD")
            .pod_id(id.to_string())
            .image_id(pause_image_id)
            .image_name(self.config.pause_image().clone())
            .namespace(metadata.namespace.clone())
            .created_at(now_unix_nanos().to_string())
            .container_state(ContainerState::Running)
            .root_fs(merged_dir.clone())
            .work_dir(work_dir)
            .run_dir(run_dir)
            .mount_point(merged_dir)
            .log_path(log_path)
            .annotations(config.annotations.clone())
            .build()
            .context("build infra container record")
        {
            Ok(record) => record,
            Err(e) => {
                let _ = self.runtime_adapter.delete_container(id).await;
                return Err((CriError::Internal(e), cleanup_taken(cleanup)));
            }
        };

        if let Err(e) = self.container_storage.put(&record).await.context("persist infra container record") {
            let _ = self.runtime_adapter.delete_container(id).await;
            return Err((CriError::Internal(e), cleanup_taken(cleanup)));
        }

        Ok(())
    }

    /// Stop every container in a pod sandbox and tear down its network,
    /// leaving the sandbox's reservation and record in place for
    /// `RemovePodSandbox`/`PodSandboxStatus`. Idempotent.
    pub async fn stop_pod_sandbox(&self, id: &str) -> Result<(), CriError> {
        let _writer = self.stop_mutex.write(id.to_string()).await;

        let exists = self.sandboxes.read().await.contains_key(id);
        if !exists {
            return Ok(());
        }

        let containers = self
            .container_storage
            .list()
            .await
            .context("list containers")
            .map_err(CriError::Internal)?;
        for record in containers.into_iter().filter(|c| c.pod_id() == id) {
            if matches!(record.container_state(), crate::container::ContainerState::Running) {
                if let Err(e) = self.runtime_adapter.kill_container(record.id(), tokio::signal::unix::SignalKind::terminate()).await {
                    warn!("kill container {} while stopping sandbox {id}: {e:#}", record.id());
                }
                let mut updated = record.clone();
                updated.set_state(crate::container::ContainerState::Stopped);
                self.container_storage.put(&updated).await.context("persist stopped container").map_err(CriError::Internal)?;
            }
        }

        if let Some(mut record) = self.sandboxes.write().await.get(id).cloned() {
            record.set_state(SandboxState::NotReady);
            self.sandboxes.write().await.insert(id.to_string(), record);
        }

        Ok(())
    }

    /// Remove a pod sandbox entirely: its containers, namespaces, run
    /// directory and registrar entries. Idempotent.
    pub async fn remove_pod_sandbox(&self, id: &str) -> Result<(), CriError> {
        self.stop_pod_sandbox(id).await?;
        let _writer = self.stop_mutex.write(id.to_string()).await;

        let record = match self.sandboxes.write().await.remove(id) {
            Some(record) => record,
            None => return Ok(()),
        };

        let containers = self
            .container_storage
            .list()
            .await
            .context("list containers")
            .map_err(CriError::Internal)?;
        for container in containers.into_iter().filter(|c| c.pod_id() == id) {
            let _ = self.runtime_adapter.delete_container(container.id()).await;
            let _ = self.container_storage.remove(container.id()).await;
            self.registrar.release_name(container.name());
            self.registrar.index_delete(container.id());
        }

        if let Err(e) = self.namespace_manager.remove(record.namespaces()) {
            warn!("unpin namespaces for sandbox {id}: {e:#}");
        }

        let mut network = self.network.lock().await;
        let _ = network.cleanup().await;
        drop(network);

        if record.run_dir().exists() {
            if let Err(e) = tokio::fs::remove_dir_all(record.run_dir()).await {
                warn!("remove sandbox run dir {}: {e:#}", record.run_dir().display());
            }
        }

        let name_key = format!("{}/{}/{}", record.namespace(), record.name(), record.attempt());
        self.registrar.release_name(&name_key);
        self.registrar.index_delete(id);

        Ok(())
    }
}

impl Cleanup {
    /// Discard a successful pipeline's undo stack without running it — used
    /// instead of `run()` once every stage committed, so a panic-driven
    /// `Cleanup::run` can't accidentally be invoked twice for the same id.
    fn run_into_noop(self) {
        drop(self);
    }
}

/// Swap `cleanup` out for an empty stack, returning the original so an error
/// path can both report the failure and still unwind everything committed so
/// far — same idiom as `container::lifecycle`'s helper of the same name.
fn cleanup_taken(cleanup: &mut Cleanup) -> Cleanup {
    std::mem::take(cleanup)
}

/// The pod's shared `/dev/shm`, sized from `Config::shm_size_bytes`.
fn shm_mount(size_bytes: i64) -> anyhow::Result<OCIMount> {
    MountBuilder::default()
        .source("shm")
        .destination("/dev/shm")
        .typ("tmpfs")
        .options(vec![
            "nosuid".to_owned(),
            "noexec".to_owned(),
            "nodev".to_owned(),
            "mode=1777".to_owned(),
            format!("size={size_bytes}"),
        ])
        .build()
        .context("build shm mount")
}

/// Materialize `/etc/hostname` into the infra container's run dir and
/// bind-mount it in, the same "materialize then bind" shape
/// `oci_spec_builder::timezone` uses for `/etc/localtime`.
fn hostname_mount(run_dir: &Path, hostname: &str) -> anyhow::Result<OCIMount> {
    let path = run_dir.join("hostname");
    std::fs::write(&path, format!("{hostname}\n")).with_context(|| format!("write {}", path.display()))?;
    MountBuilder::default()
        .source(path)
        .destination("/etc/hostname")
        .typ("bind")
        .options(vec!["ro".to_owned(), "bind".to_owned()])
        .build()
        .context("build hostname mount")
}

/// Derive a [`NamespaceConfig`] from a filter request, unused by the
/// pipeline directly but kept alongside it since `ListPodSandbox`'s state
/// filter uses the same mode comparisons.
pub fn sandbox_matches_state(state: SandboxState, wanted: Option<api::PodSandboxState>) -> bool {
    match wanted {
        None => true,
        Some(api::PodSandboxState::SandboxReady) => state == SandboxState::Ready,
        Some(api::PodSandboxState::SandboxNotready) => state == SandboxState::NotReady,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_matches_state_no_filter_matches_everything() {
        assert!(sandbox_matches_state(SandboxState::Ready, None));
        assert!(sandbox_matches_state(SandboxState::NotReady, None));
    }

    #[test]
    fn sandbox_matches_state_filters_by_state() {
        assert!(sandbox_matches_state(SandboxState::Ready, Some(api::PodSandboxState::SandboxReady)));
        assert!(!sandbox_matches_state(SandboxState::NotReady, Some(api::PodSandboxState::SandboxReady)));
    }
}
