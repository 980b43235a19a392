//! OCI Spec Builder (C9): assembles a complete `config.json` for a
//! container from its CRI request, the sandbox it runs in, and the
//! daemon's own configuration. Each concern below (mounts, namespaces,
//! user, seccomp, ...) is its own small, independently testable module;
//! this file just wires them together in the order the runtime actually
//! reads them.

pub mod annotations;
pub mod apparmor;
pub mod blockio;
pub mod cgroup;
pub mod hooks;
pub mod mounts;
pub mod namespaces;
pub mod seccomp;
pub mod sysctl;
pub mod timezone;
pub mod user;

use crate::{
    capability::Capabilities,
    config::{CgroupManager, SupplementalGroupsPolicy},
    cri::api::{LinuxContainerResources, LinuxContainerSecurityContext, Mount as CRIMount, NamespaceOption, PortMapping},
};
use anyhow::{Context, Result};
use namespaces::PinnedNamespaces;
use oci_spec::runtime::{
    LinuxBuilder, LinuxCapabilitiesBuilder, LinuxResourcesBuilder, LinuxResourcesCpuBuilder,
    LinuxResourcesMemoryBuilder, Mount as OCIMount, ProcessBuilder, RootBuilder, Spec, SpecBuilder,
};
use std::{collections::HashMap, path::Path};

/// Everything [`build`] needs to assemble a container's runtime spec; the
/// CRI request fields plus the sandbox-derived facts the container itself
/// has no way to know (cgroup parent, pinned namespaces, run directory).
pub struct SpecInputs<'a> {
    pub container_id: &'a str,
    pub sandbox_id: &'a str,
    pub rootfs: &'a Path,
    pub readonly_rootfs: bool,
    pub command: &'a [String],
    pub args: &'a [String],
    pub cwd: &'a str,
    pub env: &'a HashMap<String, String>,
    pub hostname: &'a str,
    pub cri_mounts: &'a [CRIMount],
    pub security_context: Option<&'a LinuxContainerSecurityContext>,
    pub resources: Option<&'a LinuxContainerResources>,
    pub namespace_options: Option<&'a NamespaceOption>,
    pub pinned_namespaces: &'a PinnedNamespaces,
    pub cgroup_manager: CgroupManager,
    pub cgroup_parent: &'a str,
    pub run_dir: &'a Path,
    pub daemon_default_sysctls: &'a [String],
    pub pod_sysctls: &'a HashMap<String, String>,
    pub host_network: bool,
    pub host_ipc: bool,
    pub timezone: &'a str,
    pub annotations: &'a HashMap<String, String>,
    /// Root of the daemon's persistent storage tree, used to auto-promote
    /// PRIVATE mounts under it to HOST_TO_CONTAINER (see `mounts::process`).
    pub storage_root: &'a Path,
    /// How this container's supplemental groups are resolved (see `user::resolve`).
    pub groups_policy: SupplementalGroupsPolicy,
    /// Mounts the caller wants appended regardless of the CRI request (the
    /// infra container's shm and hostname mounts, for instance).
    pub extra_mounts: &'a [OCIMount],
}

/// Assemble the full runtime spec for a container, in the order the
/// pieces depend on each other: mounts first (resolving the root
/// propagation user setup's `/etc` synthesis needs to know about), then
/// user and capabilities (seccomp's default profile needs the capability
/// set), then namespaces, cgroup path and resource limits, and finally the
/// annotation set that records what was decided.
pub fn build(inputs: &SpecInputs) -> Result<Spec> {
    let security_context = inputs.security_context;
    let privileged = security_context.map(|ctx| ctx.privileged).unwrap_or(false);

    let processed_mounts = mounts::process(inputs.cri_mounts, inputs.storage_root).context("process mounts")?;
    let mut oci_mounts = processed_mounts.mounts;
    oci_mounts.extend(inputs.extra_mounts.iter().cloned());

    let user_resolution = user::resolve(
        security_context,
        inputs.rootfs,
        inputs.run_dir,
        inputs.cri_mounts,
        inputs.groups_policy,
    )
    .context("resolve process user")?;
    oci_mounts.extend(user_resolution.extra_mounts);

    let capability_boundings = if privileged { Capabilities::all() } else { Capabilities::default() };
    let linux_capabilities = LinuxCapabilitiesBuilder::default()
        .bounding(Into::<Vec<String>>::into(&capability_boundings))
        .effective(Into::<Vec<String>>::into(&capability_boundings))
        .permitted(Into::<Vec<String>>::into(&capability_boundings))
        .build()
        .context("build linux capabilities")?;

    let seccomp_profile_path = security_context.map(|ctx| ctx.seccomp_profile_path.as_str()).unwrap_or("");
    let linux_seccomp = if privileged {
        None
    } else {
        seccomp::apply(seccomp_profile_path, capability_boundings).context("build seccomp profile")?
    };

    if let Some(localtime) = timezone::apply(inputs.timezone, inputs.run_dir).context("apply timezone")? {
        oci_mounts.push(localtime);
    }

    let merged_sysctls = sysctl::apply(
        inputs.daemon_default_sysctls,
        inputs.pod_sysctls,
        inputs.host_network,
        inputs.host_ipc,
    )
    .context("merge sysctls")?;

    let mut linux = LinuxBuilder::default()
        .cgroups_path(cgroup::path(inputs.cgroup_manager, inputs.cgroup_parent, inputs.container_id))
        .resources(build_resources(inputs.resources).context("build resources")?)
        .sysctl(merged_sysctls);
    if let Some(propagation) = processed_mounts.root_propagation {
        linux = linux.rootfs_propagation(propagation);
    }
    if let Some(seccomp) = linux_seccomp {
        linux = linux.seccomp(seccomp);
    }
    if let Some(hooks) = hooks::apply(inputs.annotations).context("build hooks")? {
        linux = linux.hooks(hooks);
    }
    linux = namespaces::apply(linux, inputs.namespace_options, inputs.pinned_namespaces).context("apply namespaces")?;
    let linux = linux.build().context("build linux section")?;

    let apparmor_profile = security_context
        .map(|ctx| apparmor::apply(&ctx.apparmor_profile))
        .unwrap_or(None);

    let mut process = ProcessBuilder::default()
        .terminal(false)
        .user(user_resolution.user)
        .args(process_args(inputs.command, inputs.args))
        .env(process_env(inputs.env))
        .cwd(if inputs.cwd.is_empty() { "/" } else { inputs.cwd })
        .capabilities(linux_capabilities)
        .no_new_privileges(security_context.map(|ctx| ctx.no_new_privs).unwrap_or(false));
    if let Some(profile) = apparmor_profile {
        process = process.apparmor_profile(profile);
    }
    let process = process.build().context("build process")?;

    let root = RootBuilder::default()
        .path(inputs.rootfs)
        .readonly(inputs.readonly_rootfs)
        .build()
        .context("build root")?;

    SpecBuilder::default()
        .version("1.0.2")
        .process(process)
        .root(root)
        .hostname(inputs.hostname)
        .mounts(oci_mounts)
        .linux(linux)
        .build()
        .context("build spec")
}

fn process_args(command: &[String], args: &[String]) -> Vec<String> {
    command.iter().chain(args.iter()).cloned().collect()
}

fn process_env(env: &HashMap<String, String>) -> Vec<String> {
    env.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

fn build_resources(resources: Option<&LinuxContainerResources>) -> Result<oci_spec::runtime::LinuxResources> {
    let mut builder = LinuxResourcesBuilder::default();
    if let Some(resources) = resources {
        let mut memory = LinuxResourcesMemoryBuilder::default();
        if resources.memory_limit_in_bytes > 0 {
            memory = memory.limit(resources.memory_limit_in_bytes);
        }
        builder = builder.memory(memory.build().context("build memory resources")?);

        let mut cpu = LinuxResourcesCpuBuilder::default();
        if resources.cpu_shares > 0 {
            cpu = cpu.shares(resources.cpu_shares as u64);
        }
        if resources.cpu_quota > 0 {
            cpu = cpu.quota(resources.cpu_quota);
        }
        if resources.cpu_period > 0 {
            cpu = cpu.period(resources.cpu_period as u64);
        }
        if !resources.cpuset_cpus.is_empty() {
            cpu = cpu.cpus(resources.cpuset_cpus.clone());
        }
        if !resources.cpuset_mems.is_empty() {
            cpu = cpu.mems(resources.cpuset_mems.clone());
        }
        builder = builder.cpu(cpu.build().context("build cpu resources")?);
    }
    // blockio::apply always returns None for this CRI subset; nothing to merge in.
    builder.build().context("build linux resources")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceType;
    use oci_spec::runtime::LinuxNamespaceType;
    use std::path::PathBuf;

    #[test]
    fn builds_minimal_spec() {
        let env = HashMap::new();
        let pod_sysctls = HashMap::new();
        let annotations = HashMap::new();
        let pinned: PinnedNamespaces = HashMap::new();

        let inputs = SpecInputs {
            container_id: "c1",
            sandbox_id: "s1",
            rootfs: Path::new("/var/lib/containrs/c1/merged"),
            readonly_rootfs: false,
            command: &["/bin/sh".to_string()],
            args: &[],
            cwd: "",
            env: &env,
            hostname: "c1",
            cri_mounts: &[],
            security_context: None,
            resources: None,
            namespace_options: None,
            pinned_namespaces: &pinned,
            cgroup_manager: CgroupManager::Cgroupfs,
            cgroup_parent: "",
            run_dir: Path::new("/tmp"),
            daemon_default_sysctls: &[],
            pod_sysctls: &pod_sysctls,
            host_network: false,
            host_ipc: false,
            timezone: "",
            annotations: &annotations,
            storage_root: Path::new("/var/lib/containrs"),
            groups_policy: crate::config::SupplementalGroupsPolicy::Merge,
            extra_mounts: &[],
        };

        let spec = build(&inputs).unwrap();
        assert_eq!(spec.process().as_ref().unwrap().args().as_ref().unwrap()[0], "/bin/sh");
        assert_eq!(spec.root().as_ref().unwrap().path(), &PathBuf::from("/var/lib/containrs/c1/merged"));
    }

    #[test]
    fn pinned_namespace_path_is_threaded_through() {
        let mut pinned: PinnedNamespaces = HashMap::new();
        pinned.insert(LinuxNamespaceType::Network, PathBuf::from("/var/run/containrs/ns/s1-net"));
        let _ = NamespaceType::Net;
        assert!(pinned.contains_key(&LinuxNamespaceType::Network));
    }
}
