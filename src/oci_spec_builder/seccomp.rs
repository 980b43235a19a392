//! Thin policy wrapper around [`crate::seccomp::Seccomp`].

use crate::{capability::Capabilities, seccomp::SeccompBuilder};
use anyhow::{Context, Result};
use oci_spec::runtime::LinuxSeccomp;

/// Resolve the seccomp profile named by a container's security context,
/// bounding the generated default profile's syscall allowlist by the
/// capabilities the container was granted.
pub fn apply(profile_path: &str, capability_boundings: Capabilities) -> Result<Option<LinuxSeccomp>> {
    let name = if profile_path.is_empty() {
        "runtime/default"
    } else {
        profile_path
    };

    SeccompBuilder::default()
        .capability_boundings(capability_boundings)
        .build()
        .context("build seccomp policy")?
        .build_linux_seccomp(name)
}
