//! Sandbox data model (C11): the in-memory record of a running pod
//! sandbox, kept in `CRIService::sandboxes` only — unlike
//! [`crate::container::ContainerRecord`] this is never written to disk,
//! since a crashed daemon treats every sandbox it no longer remembers as
//! gone and relies on the kubelet to call `RunPodSandbox` again.

use crate::{cri::api::NamespaceOption, namespace::Namespace};
use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumString};

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq)]
#[strum(serialize_all = "snake_case")]
/// Coarse lifecycle state of a sandbox, mirroring `PodSandboxState` without
/// depending on the generated protobuf enum's exact numeric representation.
pub enum SandboxState {
    Ready,
    NotReady,
}

/// Everything a sandbox's containers and later RPCs (`PodSandboxStatus`,
/// `ListPodSandbox`, container creation) need to know about the sandbox
/// they belong to.
#[derive(Builder, Clone, Debug, Getters, CopyGetters)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct SandboxRecord {
    #[get = "pub"]
    id: String,

    #[get = "pub"]
    name: String,

    #[get = "pub"]
    uid: String,

    #[get = "pub"]
    namespace: String,

    #[get_copy = "pub"]
    #[builder(default)]
    attempt: u32,

    #[get_copy = "pub"]
    created_at: i64,

    #[get_copy = "pub"]
    #[builder(default = "SandboxState::Ready")]
    state: SandboxState,

    #[get = "pub"]
    #[builder(default)]
    cgroup_parent: String,

    #[get = "pub"]
    run_dir: std::path::PathBuf,

    #[get = "pub"]
    #[builder(default)]
    namespace_options: NamespaceOption,

    #[get_copy = "pub"]
    #[builder(default)]
    host_network: bool,

    #[get_copy = "pub"]
    #[builder(default)]
    host_ipc: bool,

    #[get = "pub"]
    #[builder(default)]
    pod_sysctls: HashMap<String, String>,

    #[get = "pub"]
    #[builder(default)]
    labels: HashMap<String, String>,

    #[get = "pub"]
    #[builder(default)]
    annotations: HashMap<String, String>,

    #[get = "pub"]
    #[builder(default)]
    ip: String,

    /// Pinned namespaces this sandbox owns, so containers started inside it
    /// can point their OCI spec at the same paths instead of each getting a
    /// fresh namespace. Empty when the sandbox shares the host's.
    #[get = "pub"]
    #[builder(default)]
    namespaces: Vec<Namespace>,
}

impl SandboxRecord {
    pub fn set_state(&mut self, state: SandboxState) {
        self.state = state;
    }
}
