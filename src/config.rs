//! Configuration related structures
use clap::{crate_name, crate_version, Parser};
use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use lazy_static::lazy_static;
use log::LevelFilter;
use nix::unistd::{self, Uid};
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};
use strum::{AsRefStr, EnumString};

lazy_static! {
    static ref DEFAULT_SOCK_PATH: String = Config::default_sock_path().display().to_string();
    static ref DEFAULT_STORAGE_PATH: String = Config::default_storage_path().display().to_string();
    static ref DEFAULT_RUN_ROOT_PATH: String =
        Config::default_run_path(unistd::getuid()).display().to_string();
    static ref DEFAULT_CNI_PLUGIN_PATHS: String =
        env::var("PATH").unwrap_or_else(|_| "/opt/cni/bin".into());
    static ref DEFAULT_CONMON_BINARY: String = which::which("conmon")
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "conmon".into());
    static ref DEFAULT_RUNTIME_BINARY: String = which::which("runc")
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "runc".into());
}

#[derive(Builder, Clone, Parser, CopyGetters, Getters, Deserialize, Serialize)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
#[serde(rename_all = "kebab-case")]
#[command(
    about = "CRI - Container Runtime Interface daemon",
    after_help = "More info at: https://github.com/cri-o/crid",
    version = crate_version!(),
)]
/// Config is the main configuration structure for the server.
pub struct Config {
    #[get_copy = "pub"]
    #[arg(
        default_value("info"),
        env("CRID_LOG_LEVEL"),
        long("log-level"),
        value_parser(["trace", "debug", "info", "warn", "error", "off"]),
        short('l'),
        value_name("LEVEL")
    )]
    /// The logging level of the application.
    log_level: LevelFilter,

    #[get_copy = "pub"]
    #[arg(
        default_value("lib"),
        env("CRID_LOG_SCOPE"),
        long("log-scope"),
        value_parser([LogScope::Lib.as_ref(), LogScope::Global.as_ref()]),
        value_name("SCOPE")
    )]
    /// The logging scope of the application. If set to `global`, then all dependent crates will
    /// log on the provided level, too. Otherwise the logs are scoped to this application only.
    log_scope: LogScope,

    #[get = "pub"]
    #[arg(
        default_value(&*DEFAULT_SOCK_PATH),
        env("CRID_SOCK_PATH"),
        long("sock-path"),
        value_name("PATH")
    )]
    /// The path to the unix socket for the server.
    sock_path: PathBuf,

    #[get = "pub"]
    #[arg(
        default_value(&*DEFAULT_STORAGE_PATH),
        env("CRID_STORAGE_PATH"),
        long("storage-path"),
        value_name("PATH")
    )]
    /// The path to the persistent storage for the server.
    storage_path: PathBuf,

    #[get = "pub"]
    #[arg(
        default_value(&*DEFAULT_RUN_ROOT_PATH),
        env("CRID_RUN_ROOT_PATH"),
        long("run-root-path"),
        value_name("PATH")
    )]
    /// The path to the volatile (tmpfs-backed) run root for container state,
    /// kept separate from the persistent storage path.
    run_root_path: PathBuf,

    #[get = "pub"]
    #[arg(
        env("CRID_CNI_DEFAULT_NETWORK"),
        long("cni-default-network"),
        value_name("NAME")
    )]
    /// The default CNI network name to choose.
    cni_default_network: Option<String>,

    #[get = "pub"]
    #[arg(
        default_value("/etc/cni/net.d"),
        env("CRID_CNI_CONFIG_PATHS"),
        long("cni-config-paths"),
        value_name("PATH")
    )]
    /// The paths to the CNI configurations.
    cni_config_paths: Vec<PathBuf>,

    #[get = "pub"]
    #[arg(
        default_value(&*DEFAULT_CNI_PLUGIN_PATHS),
        env("CRID_CNI_PLUGIN_PATHS"),
        long("cni-plugin-paths"),
        value_name("PATH")
    )]
    /// The paths to the CNI plugin binaries, separated by the OS typic separator.
    cni_plugin_paths: String,

    #[get_copy = "pub"]
    #[arg(
        long("strict-layer-unpack"),
        env("CRID_STRICT_LAYER_UNPACK"),
        default_value("false")
    )]
    /// Reject bundle layers with corrupted extended attributes instead of silently skipping
    /// them on filesystems that don't support them.
    strict_layer_unpack: bool,

    #[get_copy = "pub"]
    #[arg(
        default_value("cgroupfs"),
        env("CRID_CGROUP_MANAGER"),
        long("cgroup-manager"),
        value_parser([CgroupManager::Cgroupfs.as_ref(), CgroupManager::Systemd.as_ref()]),
        value_name("MANAGER")
    )]
    /// The cgroup manager used to format container cgroup paths.
    cgroup_manager: CgroupManager,

    #[get = "pub"]
    #[arg(
        default_value(""),
        env("CRID_TIMEZONE"),
        long("timezone"),
        value_name("TZ")
    )]
    /// The timezone made available to containers via a generated `/etc/localtime`. Empty
    /// disables the bind mount and leaves the image's own timezone data in place.
    timezone: String,

    #[get = "pub"]
    #[arg(long("default-sysctl"), env("CRID_DEFAULT_SYSCTLS"), value_name("KEY=VALUE"))]
    /// Sysctls applied to every sandbox unless overridden by the pod's own configuration.
    default_sysctls: Vec<String>,

    #[get = "pub"]
    #[arg(
        default_value(&*DEFAULT_CONMON_BINARY),
        env("CRID_CONMON_BINARY"),
        long("conmon-binary"),
        value_name("PATH")
    )]
    /// Path to the `conmon` monitor binary used to supervise container processes.
    conmon_binary: PathBuf,

    #[get = "pub"]
    #[arg(
        default_value(&*DEFAULT_RUNTIME_BINARY),
        env("CRID_RUNTIME_BINARY"),
        long("runtime-binary"),
        value_name("PATH")
    )]
    /// Path to the OCI runtime binary (`runc`/`crun`) conmon drives.
    runtime_binary: PathBuf,

    #[get_copy = "pub"]
    #[arg(
        default_value("merge"),
        env("CRID_SUPPLEMENTAL_GROUPS_POLICY"),
        long("supplemental-groups-policy"),
        value_parser([SupplementalGroupsPolicy::Merge.as_ref(), SupplementalGroupsPolicy::Strict.as_ref()]),
        value_name("POLICY")
    )]
    /// Whether a container's supplemental groups come only from the CRI
    /// request (`strict`) or are merged with the ones `/etc/group` lists
    /// the resolved user as a member of (`merge`).
    supplemental_groups_policy: SupplementalGroupsPolicy,

    #[get = "pub"]
    #[arg(
        default_value("registry.k8s.io/pause:3.9"),
        env("CRID_PAUSE_IMAGE"),
        long("pause-image"),
        value_name("IMAGE")
    )]
    /// Image used to assemble a pod sandbox's infra container.
    pause_image: String,

    #[get = "pub"]
    #[arg(default_value("/pause"), env("CRID_PAUSE_COMMAND"), long("pause-command"), value_name("CMD"))]
    /// Command run inside the infra container.
    pause_command: Vec<String>,

    #[get_copy = "pub"]
    #[arg(
        default_value("65536000"),
        env("CRID_SHM_SIZE_BYTES"),
        long("shm-size-bytes"),
        value_name("BYTES")
    )]
    /// Size of the `/dev/shm` tmpfs mounted into every sandbox that doesn't
    /// share the host's IPC namespace.
    shm_size_bytes: i64,
}

impl Config {
    /// Return the default socket path depending if running as root or not.
    fn default_sock_path() -> PathBuf {
        Self::default_run_path(unistd::getuid())
            .join(crate_name!())
            .with_extension("sock")
    }

    /// Return the default storage path depending if running as root or not.
    fn default_storage_path() -> PathBuf {
        Self::default_run_path(unistd::getuid()).join("storage")
    }

    /// Return the default run path depending on the provided user ID.
    fn default_run_path(uid: Uid) -> PathBuf {
        if uid.is_root() {
            PathBuf::from("/var/run/").join(crate_name!())
        } else {
            PathBuf::from("/var/run/user")
                .join(uid.to_string())
                .join(crate_name!())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse()
    }
}

#[derive(AsRefStr, Clone, Copy, Debug, Deserialize, EnumString, PartialEq, Serialize)]
#[strum(serialize_all = "snake_case")]
/// Defines the scope of the log level
pub enum LogScope {
    /// Logging will only happen on a library level.
    Lib,

    /// All dependent libraries will log too.
    Global,
}

#[derive(AsRefStr, Clone, Copy, Debug, Deserialize, EnumString, PartialEq, Serialize)]
#[strum(serialize_all = "snake_case")]
/// Which cgroup driver a container's cgroup path is formatted for.
pub enum CgroupManager {
    /// Plain cgroupfs paths, e.g. `/kubepods/pod1/c1`.
    Cgroupfs,

    /// systemd unit slice names, e.g. `kubepods-pod1.slice:crid:c1`.
    Systemd,
}

impl Default for CgroupManager {
    fn default() -> Self {
        CgroupManager::Cgroupfs
    }
}

#[derive(AsRefStr, Clone, Copy, Debug, Deserialize, EnumString, PartialEq, Serialize)]
#[strum(serialize_all = "snake_case")]
/// How a container's supplemental groups are computed (spec §4.9 "User setup").
pub enum SupplementalGroupsPolicy {
    /// Combine `/etc/group`-derived membership with the CRI-supplied groups.
    Merge,

    /// Use only the CRI-supplied groups, ignoring `/etc/group` membership.
    Strict,
}

impl Default for SupplementalGroupsPolicy {
    fn default() -> Self {
        SupplementalGroupsPolicy::Merge
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn default_config() {
        let c = Config::default();
        assert_eq!(c.log_level(), LevelFilter::Info);
        assert!(c.cni_default_network().is_none());
        assert_eq!(c.cni_config_paths().len(), 1);
        assert!(!c.cni_plugin_paths().is_empty());
    }

    #[test]
    fn build_config() -> Result<()> {
        let c = ConfigBuilder::default()
            .log_level(LevelFilter::Warn)
            .sock_path("/some/path")
            .cni_default_network("default-network")
            .cni_config_paths(["a", "b"].iter().map(PathBuf::from).collect::<Vec<_>>())
            .cni_plugin_paths("1:2:3")
            .log_scope(LogScope::Global)
            .storage_path("/some/other/path")
            .build()?;

        assert_eq!(c.log_level(), LevelFilter::Warn);
        assert_eq!(&c.sock_path().display().to_string(), "/some/path");
        assert_eq!(c.log_scope(), LogScope::Global);
        assert_eq!(&c.storage_path().display().to_string(), "/some/other/path");
        assert_eq!(c.cni_default_network(), &Some("default-network".into()));
        assert_eq!(c.cni_config_paths().len(), 2);
        assert_eq!(c.cni_plugin_paths(), "1:2:3");

        Ok(())
    }

    #[test]
    fn default_run_path_root() {
        let uid = Uid::from_raw(0);
        assert!(uid.is_root());
        assert!(!Config::default_run_path(uid)
            .display()
            .to_string()
            .contains("user"));
    }

    #[test]
    fn default_run_path_non_root() {
        let uid = Uid::from_raw(1000);
        assert!(!uid.is_root());
        assert!(Config::default_run_path(uid)
            .display()
            .to_string()
            .contains(&uid.to_string()));
    }

    #[test]
    fn default_sock_path() {
        assert!(Config::default_sock_path()
            .display()
            .to_string()
            .contains(".sock"));
    }

    #[test]
    fn default_storage_path() {
        assert!(Config::default_storage_path()
            .display()
            .to_string()
            .contains("storage"));
    }
}
