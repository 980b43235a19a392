//! Basic Pod Sandbox types

pub mod lifecycle;
pub mod record;

use derive_builder::Builder;
use getset::Getters;
use std::{collections::HashMap, path::PathBuf};

#[derive(Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// SandboxData holds all the data passed to a pod network implementation when
/// starting or stopping a sandbox's network.
pub struct SandboxData {
    #[get = "pub"]
    /// The unique identifier.
    id: String,

    #[get = "pub"]
    /// Full name of the sandbox.
    name: String,

    #[get = "pub"]
    /// Namespace where the sandbox lives in.
    namespace: String,

    #[get = "pub"]
    /// Sandbox creation attempt. It only changes if the Kubernetes sandbox data changed or dies
    /// because of any error, not if the sandbox creation itself fails.
    attempt: u32,

    #[get = "pub"]
    /// Hostname of the sandbox.
    hostname: String,

    #[get = "pub"]
    // Path to the directory on the host in which container log files are stored.
    log_directory: PathBuf,

    #[get = "pub"]
    // Arbitrary metadata of the sandbox.
    annotations: HashMap<String, String>,

    #[get = "pub"]
    #[builder(default = "None")]
    // Path to the network namespace.
    network_namespace_path: Option<PathBuf>,
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use anyhow::Result;

    pub fn new_sandbox_data() -> Result<SandboxData> {
        let mut annotations: HashMap<String, String> = HashMap::new();
        annotations.insert("annotationkey1".into(), "annotationvalue1".into());

        Ok(SandboxDataBuilder::default()
            .id("uid")
            .name("name")
            .namespace("namespace")
            .attempt(1u32)
            .hostname("hostname")
            .log_directory("log_directory")
            .annotations(annotations)
            .build()?)
    }

    #[test]
    fn create() -> Result<()> {
        let data = new_sandbox_data()?;

        assert_eq!(data.id(), "uid");
        assert_eq!(data.name(), "name");
        assert_eq!(data.namespace(), "namespace");
        assert_eq!(*data.attempt(), 1u32);
        assert_eq!(data.hostname(), "hostname");
        assert_eq!(data.log_directory(), &PathBuf::from("log_directory"));
        assert_eq!(
            data.annotations().get("annotationkey1").map(String::as_str),
            Some("annotationvalue1")
        );
        assert!(data.network_namespace_path().is_none());

        Ok(())
    }
}
