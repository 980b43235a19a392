//! Apply a sandbox's namespace policy to the container's `Linux.namespaces`
//! list, pointing each at the path the namespace manager pinned it under
//! (`crate::namespace`) rather than letting the runtime create a fresh one.

use crate::cri::api::{NamespaceMode, NamespaceOption};
use anyhow::{Context, Result};
use oci_spec::runtime::{LinuxBuilder, LinuxNamespace, LinuxNamespaceBuilder, LinuxNamespaceType};
use std::collections::HashMap;

/// Pinned namespace paths, keyed by OCI namespace type, as produced by
/// [`crate::namespace::NamespaceManager`].
pub type PinnedNamespaces = HashMap<LinuxNamespaceType, std::path::PathBuf>;

/// Append the container's network/ipc/pid namespace entries (always mount,
/// uts and cgroup besides) to `linux`, pointing at pinned paths when the
/// sandbox shares them (`NamespaceMode::Pod`) and leaving them runtime-owned
/// otherwise (`NamespaceMode::Container`/`Node`).
pub fn apply(
    mut linux: LinuxBuilder,
    namespace_options: Option<&NamespaceOption>,
    pinned: &PinnedNamespaces,
) -> Result<LinuxBuilder> {
    let mut namespaces = vec![
        plain(LinuxNamespaceType::Mount)?,
        // Hostname (and thus UTS) is always pod-scoped, unlike net/ipc/pid
        // which the CRI request opts into per mode, so this one is pinned
        // whenever the sandbox pinned one, with no mode check.
        always_pinned(LinuxNamespaceType::Uts, pinned)?,
        plain(LinuxNamespaceType::Cgroup)?,
    ];

    let opts = namespace_options.cloned().unwrap_or_default();
    namespaces.push(resolved(LinuxNamespaceType::Network, opts.network(), pinned)?);
    namespaces.push(resolved(LinuxNamespaceType::Ipc, opts.ipc(), pinned)?);
    namespaces.push(resolved(LinuxNamespaceType::Pid, opts.pid(), pinned)?);

    linux = linux.namespaces(namespaces);
    Ok(linux)
}

fn plain(typ: LinuxNamespaceType) -> Result<LinuxNamespace> {
    LinuxNamespaceBuilder::default()
        .typ(typ)
        .build()
        .with_context(|| format!("build {typ:?} namespace"))
}

fn resolved(typ: LinuxNamespaceType, mode: NamespaceMode, pinned: &PinnedNamespaces) -> Result<LinuxNamespace> {
    let mut builder = LinuxNamespaceBuilder::default().typ(typ);
    if mode == NamespaceMode::Pod {
        if let Some(path) = pinned.get(&typ) {
            builder = builder.path(path.as_path());
        }
    }
    builder.build().with_context(|| format!("build {typ:?} namespace"))
}

fn always_pinned(typ: LinuxNamespaceType, pinned: &PinnedNamespaces) -> Result<LinuxNamespace> {
    let mut builder = LinuxNamespaceBuilder::default().typ(typ);
    if let Some(path) = pinned.get(&typ) {
        builder = builder.path(path.as_path());
    }
    builder.build().with_context(|| format!("build {typ:?} namespace"))
}
