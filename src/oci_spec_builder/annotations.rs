//! Assemble the core annotation set every container carries, so operators
//! inspecting `runtime state`/`runtime list` output (or the bundle's
//! `config.json` directly) can recover the CRI-level facts the runtime spec
//! itself has no field for.

use crate::cri::api::{LinuxContainerResources, PortMapping};
use anyhow::{Context, Result};
use std::collections::HashMap;

const KEY_CONTAINER_ID: &str = "io.containrs.container.id";
const KEY_SANDBOX_ID: &str = "io.containrs.sandbox.id";
const KEY_IMAGE_REF: &str = "io.containrs.image.ref";
const KEY_USER_REQUESTED_IMAGE: &str = "io.containrs.image.user-requested";
const KEY_LOG_PATH: &str = "io.containrs.log.path";
const KEY_HOSTNAME: &str = "io.containrs.hostname";
const KEY_HOST_NETWORK: &str = "io.containrs.host-network";
const KEY_SECCOMP_PROFILE_PATH: &str = "io.containrs.seccomp.profile-path";
const KEY_CNI_RESULT: &str = "io.containrs.cni.result";
const KEY_RUNTIME_HANDLER: &str = "io.containrs.runtime-handler";
const KEY_CREATED_AT: &str = "io.containrs.created-at";
const KEY_PORT_MAPPINGS: &str = "io.containrs.port-mappings";
const KEY_LABELS: &str = "io.containrs.labels";
const KEY_ANNOTATIONS: &str = "io.containrs.annotations";
const KEY_CGROUP_PARENT: &str = "io.containrs.cgroup-parent";
const KEY_POD_LINUX_RESOURCES: &str = "io.containrs.pod.linux-resources";
const KEY_STOP_SIGNAL: &str = "io.containrs.stop-signal";

/// Everything [`build`] needs to assemble a container's annotation set; one
/// struct rather than a dozen positional arguments since every field here
/// is independently optional or caller-computed.
pub struct AnnotationInputs<'a> {
    pub container_id: &'a str,
    pub sandbox_id: &'a str,
    pub image_ref: &'a str,
    pub user_requested_image: &'a str,
    pub log_path: &'a str,
    pub hostname: &'a str,
    pub host_network: bool,
    pub seccomp_profile_path: &'a str,
    pub cni_result: Option<&'a str>,
    pub runtime_handler: &'a str,
    pub created_at: &'a str,
    pub port_mappings: &'a [PortMapping],
    pub labels: &'a HashMap<String, String>,
    pub user_annotations: &'a HashMap<String, String>,
    pub cgroup_parent: &'a str,
    pub pod_linux_resources: Option<&'a LinuxContainerResources>,
    pub stop_signal: &'a str,
}

pub fn build(inputs: &AnnotationInputs) -> Result<HashMap<String, String>> {
    let mut annotations = HashMap::new();
    annotations.insert(KEY_CONTAINER_ID.to_owned(), inputs.container_id.to_owned());
    annotations.insert(KEY_SANDBOX_ID.to_owned(), inputs.sandbox_id.to_owned());
    annotations.insert(KEY_IMAGE_REF.to_owned(), inputs.image_ref.to_owned());
    annotations.insert(KEY_USER_REQUESTED_IMAGE.to_owned(), inputs.user_requested_image.to_owned());
    annotations.insert(KEY_LOG_PATH.to_owned(), inputs.log_path.to_owned());
    annotations.insert(KEY_HOSTNAME.to_owned(), inputs.hostname.to_owned());
    annotations.insert(KEY_HOST_NETWORK.to_owned(), inputs.host_network.to_string());
    annotations.insert(KEY_SECCOMP_PROFILE_PATH.to_owned(), inputs.seccomp_profile_path.to_owned());
    if let Some(cni_result) = inputs.cni_result {
        annotations.insert(KEY_CNI_RESULT.to_owned(), cni_result.to_owned());
    }
    annotations.insert(KEY_RUNTIME_HANDLER.to_owned(), inputs.runtime_handler.to_owned());
    annotations.insert(KEY_CREATED_AT.to_owned(), inputs.created_at.to_owned());
    annotations.insert(
        KEY_PORT_MAPPINGS.to_owned(),
        serde_json::to_string(inputs.port_mappings).context("serialize port mappings")?,
    );
    annotations.insert(KEY_LABELS.to_owned(), serde_json::to_string(inputs.labels).context("serialize labels")?);
    annotations.insert(
        KEY_ANNOTATIONS.to_owned(),
        serde_json::to_string(inputs.user_annotations).context("serialize annotations")?,
    );
    annotations.insert(KEY_CGROUP_PARENT.to_owned(), inputs.cgroup_parent.to_owned());
    if let Some(resources) = inputs.pod_linux_resources {
        annotations.insert(
            KEY_POD_LINUX_RESOURCES.to_owned(),
            serde_json::to_string(resources).context("serialize pod linux resources")?,
        );
    }
    annotations.insert(KEY_STOP_SIGNAL.to_owned(), inputs.stop_signal.to_owned());
    Ok(annotations)
}
