//! Mount translation: CRI `Mount` -> OCI runtime `Mount`, implementing the
//! §4.9 "Mount processing" policies (sort-by-depth, default-mount overrides,
//! propagation validation and root-propagation side effects, recursive
//! read-only, and the storage-root safety promotion).

use crate::cri::api::{Mount as CRIMount, MountPropagation};
use anyhow::{bail, Context, Result};
use log::debug;
use oci_spec::runtime::{get_default_mounts, Mount as OCIMount, MountBuilder};
use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
};

impl fmt::Display for MountPropagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let print = match self {
            MountPropagation::PropagationBidirectional => "rshared",
            MountPropagation::PropagationHostToContainer => "rslave",
            MountPropagation::PropagationPrivate => "rprivate",
        };
        write!(f, "{print}")
    }
}

/// How a host mount point is currently propagating, per `/proc/self/mountinfo`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MountSharing {
    Shared,
    Slave,
    Private,
}

/// The outcome of processing a container's mounts: the final OCI mount
/// list, plus the propagation the container's root mount itself must carry
/// (set by any BIDIRECTIONAL or HOST_TO_CONTAINER mount).
pub struct ProcessedMounts {
    pub mounts: Vec<OCIMount>,
    pub root_propagation: Option<&'static str>,
}

/// Translate a container's CRI mounts into OCI mounts, then append the
/// runtime's standard mount set (`/proc`, `/dev`, ...) minus any entries a
/// supplied mount overrides.
pub fn process(cri_mounts: &[CRIMount], storage_root: &Path) -> Result<ProcessedMounts> {
    let mut sorted: Vec<&CRIMount> = cri_mounts.iter().collect();
    sorted.sort_by_key(|m| Path::new(&m.container_path).components().count());

    let mut root_propagation: Option<&'static str> = None;
    let mut oci_mounts = Vec::with_capacity(sorted.len());
    for mount in &sorted {
        let (oci_mount, propagation) = build_oci_mount(mount, storage_root)?;
        if let Some(propagation) = propagation {
            root_propagation = Some(merge_root_propagation(root_propagation, propagation));
        }
        oci_mounts.push(oci_mount);
    }

    let destinations: HashSet<&str> = sorted.iter().map(|m| m.container_path.as_str()).collect();
    let dev_overridden = destinations.contains("/dev");
    let sys_overridden = destinations.contains("/sys");

    for default_mount in get_default_mounts() {
        let destination = default_mount.destination().to_string_lossy().into_owned();
        if destinations.contains(destination.as_str()) {
            continue;
        }
        if dev_overridden && (destination == "/dev" || destination.starts_with("/dev/")) {
            continue;
        }
        if sys_overridden && (destination == "/sys" || destination.starts_with("/sys/")) {
            continue;
        }
        oci_mounts.push(default_mount);
    }

    Ok(ProcessedMounts { mounts: oci_mounts, root_propagation })
}

fn merge_root_propagation(current: Option<&'static str>, new: &'static str) -> &'static str {
    match current {
        Some("rshared") => "rshared",
        Some(existing) if new != "rshared" => existing,
        _ => new,
    }
}

fn build_oci_mount(mount: &CRIMount, storage_root: &Path) -> Result<(OCIMount, Option<&'static str>)> {
    if mount.container_path.is_empty() {
        bail!("mount container path cannot be empty");
    }
    if mount.host_path.is_empty() {
        bail!("mount host path cannot be empty");
    }

    let requested = mount.propagation();
    if mount.recursive_read_only {
        if !mount.readonly {
            bail!("recursive read-only mount {} requires read-only required", mount.container_path);
        }
        if requested != MountPropagation::PropagationPrivate {
            bail!(
                "recursive read-only mount {} requires private propagation",
                mount.container_path
            );
        }
    }

    let mut host_path = PathBuf::from(&mount.host_path);
    if fs::symlink_metadata(&host_path)
        .with_context(|| format!("stat {}", host_path.display()))?
        .file_type()
        .is_symlink()
    {
        host_path = fs::read_link(&mount.host_path)
            .with_context(|| format!("read link {}", host_path.display()))?;
    }

    let auto_promoted = requested == MountPropagation::PropagationPrivate && host_path.starts_with(storage_root);
    let (propagation_str, root_propagation) = if auto_promoted {
        debug!(
            "auto-promoting mount {} under storage root {} to HOST_TO_CONTAINER",
            host_path.display(),
            storage_root.display()
        );
        ("rslave", Some("rslave"))
    } else {
        match requested {
            MountPropagation::PropagationPrivate => ("rprivate", None),
            MountPropagation::PropagationBidirectional => {
                if host_mount_sharing(&host_path)? != MountSharing::Shared {
                    bail!("mount {} requests BIDIRECTIONAL propagation but its source is not shared", host_path.display());
                }
                ("rshared", Some("rshared"))
            }
            MountPropagation::PropagationHostToContainer => {
                if host_mount_sharing(&host_path)? == MountSharing::Private {
                    bail!("mount {} requests HOST_TO_CONTAINER propagation but its source is private", host_path.display());
                }
                ("rslave", Some("rslave"))
            }
        }
    };

    let mut options = Vec::new();
    if mount.readonly {
        options.push("ro".to_owned());
    }
    if mount.recursive_read_only {
        options.push("rro".to_owned());
    }
    options.push(propagation_str.to_owned());

    let oci_mount = MountBuilder::default()
        .source(host_path)
        .destination(mount.container_path.as_str())
        .typ("bind")
        .options(options)
        .build()
        .context("build oci mount")?;

    Ok((oci_mount, root_propagation))
}

fn host_mount_sharing(path: &Path) -> Result<MountSharing> {
    let mountinfo = fs::read_to_string("/proc/self/mountinfo").context("read /proc/self/mountinfo")?;
    Ok(parse_mount_sharing(&mountinfo, path))
}

/// Pure parser over `/proc/self/mountinfo` content: finds the
/// longest-prefix-matching mount point for `path` and reports whether it's
/// shared, a slave (has a master), or private. Kept separate from
/// `host_mount_sharing` so this logic is testable without a real mount
/// namespace.
fn parse_mount_sharing(mountinfo: &str, path: &Path) -> MountSharing {
    let path = path.to_string_lossy();
    let mut best: Option<(usize, MountSharing)> = None;

    for line in mountinfo.lines() {
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() < 7 {
            continue;
        }
        let mount_point = fields[4];
        if !path.starts_with(mount_point) {
            continue;
        }
        if best.map(|(len, _)| mount_point.len() <= len).unwrap_or(false) {
            continue;
        }

        let optional_fields = &fields[6..];
        let sharing = if optional_fields.iter().any(|f| f.starts_with("shared:")) {
            MountSharing::Shared
        } else if optional_fields.iter().any(|f| f.starts_with("master:")) {
            MountSharing::Slave
        } else {
            MountSharing::Private
        };
        best = Some((mount_point.len(), sharing));
    }

    best.map(|(_, sharing)| sharing).unwrap_or(MountSharing::Private)
}
