//! Derive a container's cgroup path from its sandbox's cgroup parent.

use crate::config::CgroupManager;

/// `<cgroup_parent>/<container_id>` under cgroupfs, matching the layout
/// conmon is invoked with via `--cgroup-parent` in
/// [`crate::oci::runtime_adapter`]; under systemd, a `<slice>:crid:<id>`
/// unit name the runtime expands into a transient scope.
pub fn path(manager: CgroupManager, cgroup_parent: &str, container_id: &str) -> String {
    match manager {
        CgroupManager::Cgroupfs => {
            if cgroup_parent.is_empty() {
                format!("/{container_id}")
            } else {
                format!("{}/{container_id}", cgroup_parent.trim_end_matches('/'))
            }
        }
        CgroupManager::Systemd => {
            let slice = if cgroup_parent.is_empty() {
                "system.slice".to_string()
            } else {
                cgroup_parent.trim_end_matches('/').to_string()
            };
            format!("{slice}:crid:{container_id}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_parent_and_id() {
        assert_eq!(path(CgroupManager::Cgroupfs, "/kubepods/pod1", "c1"), "/kubepods/pod1/c1");
    }

    #[test]
    fn defaults_when_parent_empty() {
        assert_eq!(path(CgroupManager::Cgroupfs, "", "c1"), "/c1");
    }

    #[test]
    fn systemd_formats_unit_name() {
        assert_eq!(path(CgroupManager::Systemd, "kubepods-pod1.slice", "c1"), "kubepods-pod1.slice:crid:c1");
    }

    #[test]
    fn systemd_defaults_to_system_slice() {
        assert_eq!(path(CgroupManager::Systemd, "", "c1"), "system.slice:crid:c1");
    }
}
