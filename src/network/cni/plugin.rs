//! CNI plugin helpers mostly around their execution

use crate::network::cni::{
    config::DNS,
    exec::{ArgsBuilder, DefaultExec, Exec},
};
use anyhow::{format_err, Context, Result};
use derive_builder::Builder;
use getset::{Getters, Setters};
use ipnetwork::IpNetwork;
use log::trace;
use serde::{Deserialize, Serialize};
use std::{env, fmt::Debug, net::IpAddr, path::PathBuf};
use strum::{AsRefStr, EnumString, IntoStaticStr};

#[derive(Builder, Getters, Setters)]
#[builder(pattern = "owned", setter(into))]
pub struct Plugin {
    #[get]
    /// Path to the plugin binary.
    binary: PathBuf,

    #[getset(get, set = "pub")]
    #[builder(default = "Box::new(DefaultExec)")]
    /// CNI command execution helper.
    exec: Box<dyn Exec>,
}

#[derive(AsRefStr, IntoStaticStr, Copy, Clone, Debug, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "shouty_snake_case")]
enum Command {
    Add,
    Del,
    Version,
}

impl Plugin {
    /// Find the plugin binary in $PATH.
    pub fn find_binary(mut self, plugin_paths: &str) -> Result<Self> {
        self.binary = which::which_in(
            self.binary(),
            Some(if plugin_paths.is_empty() {
                env::var("PATH")?
            } else {
                plugin_paths.into()
            }),
            env::current_dir().context("get current working directory")?,
        )
        .with_context(|| {
            format!(
                "find plugin binary {} in paths: {}",
                self.binary().display(),
                plugin_paths
            )
        })?;
        trace!("Using plugin binary {}", self.binary.display());
        Ok(self)
    }

    /// Create a version request for the plugin.
    pub async fn version(&self) -> Result<VersionResult> {
        let args = ArgsBuilder::default()
            .command(Command::Version.as_ref())
            .build()
            .context("build CNI exec args")?;
        trace!("Using CNI args {:?}", args);

        let output = self
            .exec()
            .run(self.binary(), &args)
            .await
            .context("exec CNI plugin")?;
        trace!("Got CNI ouput {}", output.trim());

        serde_json::from_str::<VersionResult>(&output).context("unmarshal CNI output")
    }

    /// Add a network via the plugin.
    pub async fn add(
        &self,
        container_id: &str,
        network_namespace_path: &str,
        interface_name: &str,
        raw_cni_config: &[u8],
    ) -> Result<CNIResult> {
        Ok(self
            .cmd(
                Command::Add,
                container_id,
                network_namespace_path,
                interface_name,
                raw_cni_config,
            )
            .await?
            .context("no CNI result")?)
    }

    /// Delete a network via the plugin.
    pub async fn del(
        &self,
        container_id: &str,
        network_namespace_path: &str,
        interface_name: &str,
        raw_cni_config: &[u8],
    ) -> Result<()> {
        self.cmd(
            Command::Del,
            container_id,
            network_namespace_path,
            interface_name,
            raw_cni_config,
        )
        .await?;
        Ok(())
    }

    /// Run a command with the provided network namespace path and container ID.
    async fn cmd(
        &self,
        command: Command,
        container_id: &str,
        network_namespace_path: &str,
        interface_name: &str,
        raw_cni_config: &[u8],
    ) -> Result<Option<CNIResult>> {
        let args = ArgsBuilder::default()
            .command(command.as_ref())
            .container_id(container_id)
            .network_namespace(network_namespace_path)
            .interface_name(interface_name)
            .path(
                self.binary()
                    .parent()
                    .context("binary has no parent path")?
                    .display()
                    .to_string(),
            )
            .build()
            .context("build CNI exec args")?;
        trace!("Using CNI args {:?}", args);

        match self
            .exec()
            .run_with_stdin(self.binary(), &args, raw_cni_config)
            .await
        {
            Ok(output) if command == Command::Add => {
                let result =
                    serde_json::from_str::<CNIResult>(&output).context("unmarshal CNI result")?;
                trace!("Got CNI ouput {:?}", result);
                Ok(Some(result))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                let cni_error = serde_json::from_str::<ErrorResult>(&e.to_string())
                    .context("unmarshal CNI error")?;
                Err(format_err!("CNI error: {}", cni_error.message()))
            }
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Getters)]
/// VersionResult is the result which is returned when calling the `VERSION` CNI command.
pub struct VersionResult {
    #[get = "pub"]
    #[serde(rename = "cniVersion")]
    /// The current CNI version of this plugin.
    current: String,

    #[get = "pub"]
    #[serde(rename = "supportedVersions")]
    /// All supported versions by this plugin.
    supported_versions: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Getters)]
/// CNIResult gets returned from the plugin (via stdout) to the caller.
pub struct CNIResult {
    #[get = "pub"]
    #[serde(rename = "cniVersion")]
    /// The current CNI version of this plugin.
    cni_version: String,

    #[get = "pub"]
    #[serde(default)]
    /// The list of network interfaces.
    interfaces: Vec<NetworkInterface>,

    #[get = "pub"]
    #[serde(default)]
    /// The list of IPs.
    ips: Vec<IP>,

    #[get = "pub"]
    #[serde(default)]
    /// The list of routes.
    routes: Vec<Route>,

    #[get = "pub"]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// The DNS configuration.
    dns: Option<DNS>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Getters)]
/// Interface contains values about the created interfaces.
pub struct NetworkInterface {
    #[get = "pub"]
    name: String,

    #[get = "pub"]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mac: Option<String>,

    #[get = "pub"]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sandbox: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Getters)]
/// IP contains values necessary to configure an IP address on an interface.
pub struct IP {
    #[get = "pub"]
    /// IP version, either "4" or "6"
    version: String,

    #[get = "pub"]
    /// Index into Result structs Interfaces list
    interface: usize,

    #[get = "pub"]
    address: IpNetwork,

    #[get = "pub"]
    gateway: IpAddr,
}

#[derive(Clone, Serialize, Deserialize, Debug, Getters)]
pub struct Route {
    #[get = "pub"]
    dst: IpNetwork,

    #[get = "pub"]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gw: Option<IpAddr>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, Getters)]
/// Error gets returned in case the CNI plugin command fails.
pub struct ErrorResult {
    #[get = "pub"]
    /// Error code.
    code: u64,

    #[get = "pub"]
    #[serde(rename = "msg")]
    /// Error message.
    message: String,
}
