//! Namespace Manager (C8): creates, pins, and later unlinks network/IPC/UTS
//! (and optionally PID) namespaces outside any container's lifetime, so the
//! infra container can inherit them and they outlive it. This is the only
//! component allowed to unpin a namespace; all other components hold
//! references to the paths it hands out.

mod pinns;

use pinns::{Arg, Pinns, PinnsBuilder};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Mutex,
};
use thiserror::Error;

pub use pinns::LogLevel;

pub(crate) type Result<T> = std::result::Result<T, NamespaceError>;

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("pinning namespace failed: {0}")]
    Pinning(String),

    #[error(transparent)]
    Builder(#[from] derive_builder::UninitializedFieldError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NamespaceType {
    Ipc,
    Net,
    Uts,
    Pid,
}

impl NamespaceType {
    fn pin_arg(self) -> Arg {
        match self {
            NamespaceType::Ipc => Arg::Ipc,
            NamespaceType::Net => Arg::Net,
            NamespaceType::Uts => Arg::Uts,
            NamespaceType::Pid => Arg::Pid,
        }
    }

    fn file_name(self, sandbox_id: &str) -> String {
        let kind = match self {
            NamespaceType::Ipc => "ipc",
            NamespaceType::Net => "net",
            NamespaceType::Uts => "uts",
            NamespaceType::Pid => "pid",
        };
        format!("{}-{}", sandbox_id, kind)
    }
}

#[derive(Clone, Debug)]
pub struct Namespace {
    pub typ: NamespaceType,
    pub path: PathBuf,
}

/// Which namespace types a pod owns versus shares with the host — requested
/// types are pinned; the rest are left untouched (host network / host IPC).
#[derive(Clone, Copy, Debug, Default)]
pub struct NamespaceConfig {
    pub ipc: bool,
    pub net: bool,
    pub uts: bool,
    pub pid: bool,
}

impl NamespaceConfig {
    fn requested(self) -> Vec<NamespaceType> {
        let mut types = Vec::new();
        if self.ipc {
            types.push(NamespaceType::Ipc);
        }
        if self.net {
            types.push(NamespaceType::Net);
        }
        if self.uts {
            types.push(NamespaceType::Uts);
        }
        if self.pid {
            types.push(NamespaceType::Pid);
        }
        types
    }
}

/// Owns the `pinns` wrapper and the SELinux process-label reference counter
/// (two sandboxes sharing a label keep the bind-mount alive until both
/// release it).
pub struct NamespaceManager {
    pinns: Pinns,
    label_refs: Mutex<HashMap<String, usize>>,
}

impl NamespaceManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pinns: PinnsBuilder::default().build()?,
            label_refs: Mutex::new(HashMap::new()),
        })
    }

    #[cfg(test)]
    fn with_pinns(pinns: Pinns) -> Self {
        Self {
            pinns,
            label_refs: Mutex::new(HashMap::new()),
        }
    }

    /// Pin every namespace type requested by `cfg` under a single
    /// `pinns` invocation, returning one [`Namespace`] per pinned type.
    pub async fn new_pod_namespaces(
        &self,
        sandbox_id: &str,
        cfg: NamespaceConfig,
    ) -> Result<Vec<Namespace>> {
        let requested = cfg.requested();
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let mut args: Vec<Arg> = requested.iter().map(|t| t.pin_arg()).collect();
        args.push(Arg::Dir(self.pinns.pin_dir().clone()));
        args.push(Arg::FileName(sandbox_id.to_string()));

        let output = self.pinns.run(&args).await?;
        if !output.status.success() {
            return Err(NamespaceError::Pinning(format!(
                "pinns exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(requested
            .into_iter()
            .map(|typ| Namespace {
                typ,
                path: self.pinns.pin_dir().join(typ.file_name(sandbox_id)),
            })
            .collect())
    }

    /// Acquire a reference to an SELinux process label, pinning its
    /// bind-mount on first use.
    pub fn acquire_label(&self, level: &str) {
        *self
            .label_refs
            .lock()
            .expect("namespace label lock poisoned")
            .entry(level.to_string())
            .or_insert(0) += 1;
    }

    /// Release a reference; the label's bind-mount is only actually torn
    /// down when the last reference is released.
    pub fn release_label(&self, level: &str) -> bool {
        let mut refs = self.label_refs.lock().expect("namespace label lock poisoned");
        match refs.get_mut(level) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                refs.remove(level);
                true
            }
            None => true,
        }
    }

    /// Path to a pinned namespace for `sandbox_id`.
    pub fn path(&self, sandbox_id: &str, typ: NamespaceType) -> PathBuf {
        self.pinns.pin_dir().join(typ.file_name(sandbox_id))
    }

    /// Unlink the bind-mount files for every namespace this sandbox pinned.
    pub fn remove(&self, namespaces: &[Namespace]) -> Result<()> {
        for ns in namespaces {
            if ns.path.exists() {
                std::fs::remove_file(&ns.path)
                    .map_err(|e| NamespaceError::Pinning(e.to_string()))?;
            }
        }
        Ok(())
    }
}
