//! Storage Service (C5): owns the on-disk layout for container working
//! data, volatile run state, and persisted metadata, following the same
//! "open directory, persist on demand" shape `DefaultKeyValueStorage` uses
//! but laid out as the plain directories spec section 6 names rather than
//! a kv store, since each container's record must be independently
//! readable/removable by id.

use crate::container::ContainerRecord;
use anyhow::{Context, Result};
use log::warn;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Owns the persistent `root` and volatile `run_root` directory trees for
/// container storage.
pub struct ContainerStorage {
    root: PathBuf,
    run_root: PathBuf,
}

impl ContainerStorage {
    pub fn new(root: PathBuf, run_root: PathBuf) -> Self {
        Self { root, run_root }
    }

    /// `<root>/containerWork/<id>` — a container's persistent working
    /// directory (bundle mountpoint, config.json, etc).
    pub fn work_dir(&self, id: &str) -> PathBuf {
        self.root.join("containerWork").join(id)
    }

    /// `<run_root>/containerRun/<id>` — volatile run-time state (pidfiles,
    /// exit status, conmon sockets).
    pub fn run_dir(&self, id: &str) -> PathBuf {
        self.run_root.join("containerRun").join(id)
    }

    /// `<root>/containerInfo/<id>` — the container's `ContainerRecord` JSON.
    pub fn info_path(&self, id: &str) -> PathBuf {
        self.root.join("containerInfo").join(id)
    }

    /// Create the work/run directory pair for a new container.
    pub async fn allocate(&self, id: &str) -> Result<(PathBuf, PathBuf)> {
        let work_dir = self.work_dir(id);
        let run_dir = self.run_dir(id);
        fs::create_dir_all(&work_dir)
            .await
            .with_context(|| format!("create {}", work_dir.display()))?;
        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("create {}", run_dir.display()))?;
        Ok((work_dir, run_dir))
    }

    /// Persist a container's record, write-to-temp-then-rename as the
    /// bundle store does for its index.
    pub async fn put(&self, record: &ContainerRecord) -> Result<()> {
        let info_dir = self.root.join("containerInfo");
        fs::create_dir_all(&info_dir)
            .await
            .with_context(|| format!("create {}", info_dir.display()))?;

        let json = serde_json::to_vec_pretty(record).context("serialize container record")?;
        let final_path = self.info_path(record.id());
        let tmp_path = final_path.with_extension("tmp");
        fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path)
            .await
            .context("rename container record into place")
    }

    /// Read a container's record by id.
    pub async fn get(&self, id: &str) -> Result<Option<ContainerRecord>> {
        let path = self.info_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let bytes = fs::read(&path).await.with_context(|| format!("read {}", path.display()))?;
        Ok(Some(serde_json::from_slice(&bytes).with_context(|| {
            format!("parse container record {}", path.display())
        })?))
    }

    /// List every persisted container record.
    pub async fn list(&self) -> Result<Vec<ContainerRecord>> {
        let info_dir = self.root.join("containerInfo");
        let mut records = Vec::new();
        let mut entries = match fs::read_dir(&info_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e).with_context(|| format!("read dir {}", info_dir.display())),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().map(|e| e == "tmp").unwrap_or(false) {
                continue;
            }
            let bytes = fs::read(entry.path())
                .await
                .with_context(|| format!("read {}", entry.path().display()))?;
            records.push(serde_json::from_slice(&bytes).with_context(|| {
                format!("parse container record {}", entry.path().display())
            })?);
        }
        Ok(records)
    }

    /// Remove a container's record, work dir, and run dir.
    pub async fn remove(&self, id: &str) -> Result<()> {
        for path in [self.info_path(id), self.work_dir(id), self.run_dir(id)] {
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path).await,
                Ok(_) => fs::remove_file(&path).await,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
            .with_context(|| format!("remove {}", path.display()))?;
        }
        Ok(())
    }

    /// Remove any `containerWork/<id>` directory with no matching entry in
    /// `live_ids`, logging (not failing) on partial per-entry errors — the
    /// same policy cleanup lists use.
    pub async fn garbage_collect(&self, live_ids: &HashSet<String>) -> Result<()> {
        let work_root = self.root.join("containerWork");
        let mut entries = match fs::read_dir(&work_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("read dir {}", work_root.display())),
        };
        while let Some(entry) = entries.next_entry().await? {
            let id = entry.file_name().to_string_lossy().into_owned();
            if live_ids.contains(&id) {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(entry.path()).await {
                warn!("garbage collect {} failed: {:#}", entry.path().display(), e);
            }
        }
        Ok(())
    }
}

/// Shared helper so the overlay composer can address a container's bundle
/// mount point beneath its work directory.
pub fn merged_root_path(work_dir: &Path) -> PathBuf {
    work_dir.join("merged")
}
