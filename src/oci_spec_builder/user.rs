//! Resolve the OCI `Process.user` from a container's security context and,
//! when the container doesn't bind its own `/etc/passwd`/`/etc/group`,
//! synthesize minimal versions into the run directory and bind-mount them —
//! the same "materialize into run dir, then bind-mount" shape
//! [`crate::oci_spec_builder::timezone`]'s `/etc/localtime` handling uses.

use crate::{config::SupplementalGroupsPolicy, cri::api::{LinuxContainerSecurityContext, Mount as CRIMount}};
use anyhow::{Context, Result};
use oci_spec::runtime::{Mount as OCIMount, MountBuilder, User, UserBuilder};
use std::{collections::HashSet, fs, path::Path};

/// Outcome of resolving a container's effective user: the OCI `User` plus
/// any `/etc/passwd`/`/etc/group` bind mounts that need to be appended to
/// the spec's mount list.
pub struct UserResolution {
    pub user: User,
    pub extra_mounts: Vec<OCIMount>,
}

struct PasswdEntry {
    name: String,
    uid: u32,
    gid: u32,
    home: String,
}

/// Resolve the effective uid/gid/supplemental-groups for a container and
/// decide whether `/etc/passwd`/`/etc/group` need synthesizing.
pub fn resolve(
    security_context: Option<&LinuxContainerSecurityContext>,
    rootfs: &Path,
    run_dir: &Path,
    cri_mounts: &[CRIMount],
    groups_policy: SupplementalGroupsPolicy,
) -> Result<UserResolution> {
    let passwd = read_passwd(rootfs);

    let run_as_user = security_context.and_then(|ctx| ctx.run_as_user.as_ref()).map(|v| v.value as u32);
    let run_as_username = security_context.map(|ctx| ctx.run_as_username.as_str()).unwrap_or("");

    let (uid, gid, username, home) = if let Some(uid) = run_as_user {
        match passwd.iter().find(|e| e.uid == uid) {
            Some(entry) => (uid, entry.gid, entry.name.clone(), entry.home.clone()),
            None => (uid, 0, String::new(), "/".to_string()),
        }
    } else if !run_as_username.is_empty() {
        let entry = passwd
            .iter()
            .find(|e| e.name == run_as_username)
            .ok_or_else(|| anyhow::anyhow!("run_as_username {run_as_username} not found in container's passwd database"))?;
        (entry.uid, entry.gid, entry.name.clone(), entry.home.clone())
    } else {
        (0, 0, "root".to_string(), "/root".to_string())
    };

    let cri_supplemental: Vec<u32> = security_context
        .map(|ctx| ctx.supplemental_groups.iter().filter_map(|g| g.parse::<u32>().ok()).collect())
        .unwrap_or_default();

    let mut additional_gids = match groups_policy {
        SupplementalGroupsPolicy::Strict => cri_supplemental,
        SupplementalGroupsPolicy::Merge => {
            let mut gids = group_membership_gids(rootfs, &username);
            gids.extend(cri_supplemental);
            gids
        }
    };
    additional_gids.sort_unstable();
    additional_gids.dedup();

    let mut builder = UserBuilder::default().uid(uid).gid(gid);
    if !additional_gids.is_empty() {
        builder = builder.additional_gids(additional_gids);
    }
    let user = builder.build().context("build process user")?;

    let extra_mounts = if etc_is_bound(cri_mounts) {
        Vec::new()
    } else {
        synthesize_passwd_and_group(run_dir, uid, gid, &username, &home).context("synthesize passwd/group")?
    };

    Ok(UserResolution { user, extra_mounts })
}

fn read_passwd(rootfs: &Path) -> Vec<PasswdEntry> {
    let content = match fs::read_to_string(rootfs.join("etc/passwd")) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 6 {
                return None;
            }
            Some(PasswdEntry {
                name: fields[0].to_string(),
                uid: fields[2].parse().ok()?,
                gid: fields[3].parse().ok()?,
                home: fields[5].to_string(),
            })
        })
        .collect()
}

fn group_membership_gids(rootfs: &Path, username: &str) -> Vec<u32> {
    if username.is_empty() {
        return Vec::new();
    }
    let content = match fs::read_to_string(rootfs.join("etc/group")) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 4 {
                return None;
            }
            let gid: u32 = fields[2].parse().ok()?;
            let members: HashSet<&str> = fields[3].split(',').collect();
            members.contains(username).then_some(gid)
        })
        .collect()
}

fn etc_is_bound(cri_mounts: &[CRIMount]) -> bool {
    cri_mounts
        .iter()
        .any(|m| matches!(m.container_path.as_str(), "/etc" | "/etc/passwd" | "/etc/group"))
}

fn synthesize_passwd_and_group(run_dir: &Path, uid: u32, gid: u32, username: &str, home: &str) -> Result<Vec<OCIMount>> {
    let mut passwd = "root:x:0:0:root:/root:/bin/sh\n".to_string();
    if uid != 0 {
        let name = if username.is_empty() { uid.to_string() } else { username.to_string() };
        passwd.push_str(&format!("{name}:x:{uid}:{gid}:{name}:{home}:/bin/sh\n"));
    }

    let mut group = "root:x:0:\n".to_string();
    if gid != 0 {
        group.push_str(&format!("{gid}:x:{gid}:\n"));
    }

    let passwd_path = run_dir.join("passwd");
    let group_path = run_dir.join("group");
    fs::write(&passwd_path, passwd).with_context(|| format!("write {}", passwd_path.display()))?;
    fs::write(&group_path, group).with_context(|| format!("write {}", group_path.display()))?;

    let mount = |source: std::path::PathBuf, destination: &str| -> Result<OCIMount> {
        MountBuilder::default()
            .source(source)
            .destination(destination)
            .typ("bind")
            .options(vec!["rw".to_owned(), "bind".to_owned()])
            .build()
            .with_context(|| format!("build {destination} mount"))
    };

    Ok(vec![mount(passwd_path, "/etc/passwd")?, mount(group_path, "/etc/group")?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rootfs_with_passwd(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let etc = dir.path().join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("passwd"), contents).unwrap();
        dir.path().to_path_buf()
    }

    #[test]
    fn defaults_to_root_when_security_context_is_none() {
        let dir = TempDir::new().unwrap();
        let run_dir = TempDir::new().unwrap();
        let resolution = resolve(None, dir.path(), run_dir.path(), &[], SupplementalGroupsPolicy::Merge).unwrap();
        assert_eq!(resolution.user.uid(), 0);
        assert_eq!(resolution.user.gid(), 0);
        assert_eq!(resolution.extra_mounts.len(), 2);
    }

    #[test]
    fn resolves_run_as_username_from_passwd() {
        let dir = TempDir::new().unwrap();
        let rootfs = rootfs_with_passwd(&dir, "root:x:0:0:root:/root:/bin/sh\napp:x:1000:1000:app:/home/app:/bin/sh\n");
        let run_dir = TempDir::new().unwrap();

        let ctx = LinuxContainerSecurityContext {
            run_as_username: "app".into(),
            ..Default::default()
        };
        let resolution = resolve(Some(&ctx), &rootfs, run_dir.path(), &[], SupplementalGroupsPolicy::Merge).unwrap();
        assert_eq!(resolution.user.uid(), 1000);
        assert_eq!(resolution.user.gid(), 1000);
    }

    #[test]
    fn unknown_run_as_username_fails() {
        let dir = TempDir::new().unwrap();
        let rootfs = rootfs_with_passwd(&dir, "root:x:0:0:root:/root:/bin/sh\n");
        let run_dir = TempDir::new().unwrap();

        let ctx = LinuxContainerSecurityContext {
            run_as_username: "missing".into(),
            ..Default::default()
        };
        let err = resolve(Some(&ctx), &rootfs, run_dir.path(), &[], SupplementalGroupsPolicy::Merge).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn strict_policy_ignores_group_membership() {
        let dir = TempDir::new().unwrap();
        let etc = dir.path().join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("passwd"), "root:x:0:0:root:/root:/bin/sh\napp:x:1000:1000:app:/home/app:/bin/sh\n").unwrap();
        fs::write(etc.join("group"), "root:x:0:\nwheel:x:10:app\n").unwrap();
        let run_dir = TempDir::new().unwrap();

        let ctx = LinuxContainerSecurityContext {
            run_as_username: "app".into(),
            supplemental_groups: vec!["2000".into()],
            ..Default::default()
        };
        let resolution = resolve(Some(&ctx), dir.path(), run_dir.path(), &[], SupplementalGroupsPolicy::Strict).unwrap();
        assert_eq!(resolution.user.additional_gids(), &Some(vec![2000]));
    }

    #[test]
    fn merge_policy_combines_group_membership_and_cri_groups() {
        let dir = TempDir::new().unwrap();
        let etc = dir.path().join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("passwd"), "root:x:0:0:root:/root:/bin/sh\napp:x:1000:1000:app:/home/app:/bin/sh\n").unwrap();
        fs::write(etc.join("group"), "root:x:0:\nwheel:x:10:app\n").unwrap();
        let run_dir = TempDir::new().unwrap();

        let ctx = LinuxContainerSecurityContext {
            run_as_username: "app".into(),
            supplemental_groups: vec!["2000".into()],
            ..Default::default()
        };
        let resolution = resolve(Some(&ctx), dir.path(), run_dir.path(), &[], SupplementalGroupsPolicy::Merge).unwrap();
        assert_eq!(resolution.user.additional_gids(), &Some(vec![10, 2000]));
    }

    #[test]
    fn bound_etc_skips_synthesis() {
        let dir = TempDir::new().unwrap();
        let run_dir = TempDir::new().unwrap();
        let mounts = vec![CRIMount { container_path: "/etc".into(), host_path: "/host/etc".into(), ..Default::default() }];
        let resolution = resolve(None, dir.path(), run_dir.path(), &mounts, SupplementalGroupsPolicy::Merge).unwrap();
        assert!(resolution.extra_mounts.is_empty());
    }
}
