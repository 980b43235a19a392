//! CNI network config types
use crate::network::cni::exec::{ArgsBuilder, Exec};
use anyhow::{bail, Context, Result};
use derive_builder::Builder;
use getset::Getters;
use log::trace;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    convert::Into,
    fs::File,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into))]
/// The CNI plugin definition.
pub struct Config<T>
where
    T: Default,
{
    #[getset(get = "pub")]
    /// The name of the plugin.
    name: String,

    #[getset(get = "pub")]
    /// The path to the configuration file.
    file: PathBuf,

    #[getset(get = "pub")]
    /// The configuration list.
    list: ConfigListFile,

    #[get]
    #[builder(default = "T::default()")]
    /// CNI command execution helper.
    exec: T,
}

impl<T> Config<T>
where
    T: Clone + Default + Exec,
{
    /// Verifies that a given plugin `name` is supported by the provided `version`.
    pub async fn validate(&self) -> Result<()> {
        let version = self
            .list()
            .cni_version()
            .as_ref()
            .context("no config `cniVersion` provided")?;

        let args = ArgsBuilder::default()
            .command("VERSION")
            .build()
            .context("build CNI exec args")?;

        for plugin in self.list().plugins() {
            let binary = which::which(plugin.typ())
                .with_context(|| format!("find plugin binary {} in $PATH", plugin.typ()))?;
            trace!("Using plugin binary {}", binary.display());

            trace!("Using CNI args {:?}", args);

            let output = self
                .exec()
                .run(&binary, &args)
                .await
                .context("exec CNI plugin")?;
            trace!("Got CNI ouput {}", output);

            if !serde_json::from_str::<VersionResult>(&output)
                .context("unmarshal CNI output")?
                .supported_versions()
                .contains(&version.into())
            {
                bail!(
                    "plugin {} does not support config version {}",
                    plugin.typ(),
                    version
                )
            }
        }

        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Getters)]
/// VersionResult is the result which is returned when calling the `VERSION` CNI command.
pub struct VersionResult {
    #[get]
    #[serde(rename = "cniVersion")]
    /// The current CNI version of this plugin.
    current: String,

    #[get]
    #[serde(rename = "supportedVersions")]
    /// All supported versions by this plugin.
    supported_versions: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
// Config describes a CNI network configuration.
pub struct ConfigFile {
    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "cniVersion"
    )]
    cni_version: Option<String>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    #[getset(get = "pub")]
    #[serde(rename = "type")]
    typ: String,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capabilities: Option<HashMap<String, bool>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ipam: Option<IPAM>,

    #[getset(get = "pub")]
    #[serde(default)]
    dns: DNS,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "prevResult"
    )]
    raw_prev_result: Option<HashMap<String, Vec<u8>>>,
}

impl ConfigFile {
    /// Load a new ConfigFile from the provided file `Path`.
    pub fn from(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open file {}", path.display()))?;
        let mut config: Self = serde_json::from_reader(file)
            .with_context(|| format!("deserialize CNI config from file {}", path.display()))?;

        if config.name().is_none() {
            config.name = Some(config.typ().clone());
        }

        Ok(config)
    }
}

impl Into<ConfigListFile> for ConfigFile {
    fn into(self) -> ConfigListFile {
        ConfigListFile {
            cni_version: self.cni_version.clone(),
            name: self.name.clone(),
            plugins: vec![self],
            ..Default::default()
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
// ConfigListFile describes an ordered list of network configurations.
pub struct ConfigListFile {
    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "cniVersion"
    )]
    cni_version: Option<String>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "disableCheck"
    )]
    disable_check: Option<bool>,

    #[getset(get = "pub")]
    plugins: Vec<ConfigFile>,
}

impl ConfigListFile {
    /// Load a new ConfigListFile from the provided file `Path`
    pub fn from(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open file {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("deserialize CNI config list from file {}", path.display()))
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
pub struct IPAM {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    typ: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// DNS contains values interesting for DNS resolvers
pub struct DNS {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nameservers: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<String>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    search: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
}
