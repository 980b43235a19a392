//! Container data model and lifecycle (C12).

pub mod lifecycle;

use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};
use strum::{AsRefStr, Display, EnumString};

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Lifecycle state of a container, as tracked by the Storage Service —
/// distinct from [`crate::oci::container::ContainerState`], which reflects
/// what the runtime itself reports.
pub enum ContainerState {
    Created,
    Running,
    Stopped,
    Removed,
}

/// The persisted record for a single container, written as
/// `<root>/containerInfo/<id>` (see `storage::container_storage`).
#[derive(Builder, Clone, Debug, Getters, CopyGetters, Serialize, Deserialize)]
#[builder(pattern = "owned", setter(into, strip_option))]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    #[get = "pub"]
    id: String,

    #[get = "pub"]
    name: String,

    #[get = "pub"]
    pod_id: String,

    #[get = "pub"]
    image_id: String,

    #[get = "pub"]
    #[builder(default)]
    image_name: String,

    #[get = "pub"]
    #[builder(default)]
    metadata_name: String,

    #[get_copy = "pub"]
    #[builder(default)]
    attempt: u32,

    #[get_copy = "pub"]
    #[builder(default)]
    uid: Option<u32>,

    #[get = "pub"]
    #[builder(default)]
    namespace: String,

    #[get_copy = "pub"]
    #[builder(default)]
    privileged: bool,

    #[get = "pub"]
    created_at: String,

    #[get_copy = "pub"]
    #[serde(rename = "state")]
    #[builder(default = "ContainerState::Created")]
    container_state: ContainerState,

    #[get = "pub"]
    #[builder(default)]
    root_fs: PathBuf,

    #[get = "pub"]
    work_dir: PathBuf,

    #[get = "pub"]
    run_dir: PathBuf,

    #[get = "pub"]
    #[builder(default)]
    mount_point: PathBuf,

    #[get = "pub"]
    #[builder(default)]
    log_path: PathBuf,

    #[get = "pub"]
    #[builder(default)]
    process_label: Option<String>,

    #[get = "pub"]
    #[builder(default)]
    mount_label: Option<String>,

    #[get = "pub"]
    #[builder(default)]
    seccomp_ref: Option<String>,

    #[get = "pub"]
    #[builder(default)]
    volumes: Vec<String>,

    #[get = "pub"]
    #[builder(default)]
    annotations: HashMap<String, String>,

    #[get = "pub"]
    #[builder(default)]
    ips: Vec<String>,
}

impl ContainerRecord {
    /// Replace the tracked lifecycle state. Only `container::lifecycle`
    /// should call this, always after the runtime adapter confirms the
    /// transition succeeded.
    pub fn set_state(&mut self, state: ContainerState) {
        self.container_state = state;
    }
}
