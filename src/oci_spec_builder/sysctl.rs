//! Merge daemon-default sysctls with the pod's own, rejecting namespaced
//! sysctls a pod that shares the host's network or IPC namespace has no
//! business setting.

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Sysctl key prefixes that only make sense inside a private network
/// namespace.
const NET_NAMESPACED_PREFIXES: &[&str] = &["net."];

/// Sysctl keys that only make sense inside a private IPC namespace.
const IPC_NAMESPACED_KEYS: &[&str] = &["kernel.msgmax", "kernel.msgmnb", "kernel.msgmni", "kernel.sem", "kernel.shmall", "kernel.shmmax", "kernel.shmmni", "kernel.shm_rmid_forced"];

/// Parse `key=value` daemon defaults, overlay the pod's own sysctls on top,
/// and reject any namespaced sysctl the pod's sandbox can't own.
pub fn apply(daemon_defaults: &[String], pod_sysctls: &HashMap<String, String>, host_network: bool, host_ipc: bool) -> Result<HashMap<String, String>> {
    let mut merged = HashMap::new();
    for default in daemon_defaults {
        if let Some((key, value)) = default.split_once('=') {
            merged.insert(key.to_owned(), value.to_owned());
        }
    }
    for (key, value) in pod_sysctls {
        merged.insert(key.clone(), value.clone());
    }

    for key in merged.keys() {
        if host_network && NET_NAMESPACED_PREFIXES.iter().any(|p| key.starts_with(p)) {
            bail!("sysctl {key} requires a private network namespace, but the pod shares the host's");
        }
        if host_ipc && IPC_NAMESPACED_KEYS.contains(&key.as_str()) {
            bail!("sysctl {key} requires a private IPC namespace, but the pod shares the host's");
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_defaults_and_overrides() {
        let defaults = vec!["net.core.somaxconn=128".to_string()];
        let mut pod = HashMap::new();
        pod.insert("net.core.somaxconn".to_string(), "256".to_string());

        let merged = apply(&defaults, &pod, false, false).unwrap();
        assert_eq!(merged.get("net.core.somaxconn"), Some(&"256".to_string()));
    }

    #[test]
    fn rejects_net_sysctl_on_host_network() {
        let mut pod = HashMap::new();
        pod.insert("net.core.somaxconn".to_string(), "256".to_string());
        assert!(apply(&[], &pod, true, false).is_err());
    }

    #[test]
    fn rejects_ipc_sysctl_on_host_ipc() {
        let mut pod = HashMap::new();
        pod.insert("kernel.shmmax".to_string(), "1024".to_string());
        assert!(apply(&[], &pod, false, true).is_err());
    }
}
