//! Make the daemon's configured timezone available inside the container by
//! bind-mounting a generated `/etc/localtime` from the run directory, the
//! same "materialize into run dir, then bind-mount" shape
//! [`crate::oci_spec_builder::user`]'s `/etc/passwd` synthesis uses.

use anyhow::{Context, Result};
use oci_spec::runtime::{Mount as OCIMount, MountBuilder};
use std::path::Path;

const ZONEINFO_ROOT: &str = "/usr/share/zoneinfo";

/// Copy the named zone's data into `run_dir/localtime` and return the
/// private, no-suid, no-exec bind mount for it, or `None` when the daemon
/// carries no configured timezone.
pub fn apply(timezone: &str, run_dir: &Path) -> Result<Option<OCIMount>> {
    if timezone.is_empty() {
        return Ok(None);
    }

    let zoneinfo_path = Path::new(ZONEINFO_ROOT).join(timezone);
    let localtime_path = run_dir.join("localtime");
    std::fs::copy(&zoneinfo_path, &localtime_path)
        .with_context(|| format!("copy {} to {}", zoneinfo_path.display(), localtime_path.display()))?;

    let mount = MountBuilder::default()
        .source(localtime_path)
        .destination("/etc/localtime")
        .typ("bind")
        .options(vec![
            "ro".to_owned(),
            "rprivate".to_owned(),
            "nosuid".to_owned(),
            "noexec".to_owned(),
            "bind".to_owned(),
        ])
        .build()
        .context("build localtime mount")?;
    Ok(Some(mount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timezone_is_a_noop() {
        assert!(apply("", Path::new("/tmp")).unwrap().is_none());
    }
}
