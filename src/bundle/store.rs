//! Bundle Store (C2): tracks every pulled bundle by id and by
//! name/version, backed by an atomically-persisted JSON index plus one
//! `bundle.json` per bundle, mirroring how `DefaultKeyValueStorage` treats
//! "open directory, persist on demand" but specialized to the single
//! `Bundles.json` document the data model requires.

use crate::bundle::{Bundle, BundleName};
use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;

/// `name -> version -> id`, serialized as `Bundles.json`.
#[derive(Default, serde::Serialize, serde::Deserialize)]
struct BundleIndex(HashMap<String, HashMap<String, String>>);

impl BundleIndex {
    fn get(&self, name: &BundleName) -> Option<&String> {
        self.0.get(&name.name)?.get(&name.version)
    }

    fn insert(&mut self, name: BundleName, id: String) {
        self.0.entry(name.name).or_default().insert(name.version, id);
    }

    fn remove(&mut self, name: &BundleName) {
        if let Some(versions) = self.0.get_mut(&name.name) {
            versions.remove(&name.version);
            if versions.is_empty() {
                self.0.remove(&name.name);
            }
        }
    }
}

/// Persistent store of pulled [`Bundle`]s, keyed both by id and by name.
pub struct BundleStore {
    root: PathBuf,
    index: RwLock<BundleIndex>,
}

impl BundleStore {
    const INDEX_FILE: &'static str = "Bundles.json";

    /// Open (creating if absent) the bundle store rooted at `root`.
    pub async fn open(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).with_context(|| format!("create bundle root {}", root.display()))?;
        let index_path = root.join(Self::INDEX_FILE);
        let index = if index_path.exists() {
            let bytes = fs::read(&index_path).context("read Bundles.json")?;
            serde_json::from_slice(&bytes).context("parse Bundles.json")?
        } else {
            BundleIndex::default()
        };
        Ok(Self {
            root,
            index: RwLock::new(index),
        })
    }

    fn bundle_dir(&self, id: &str) -> PathBuf {
        self.root.join("bundles").join(id)
    }

    fn bundle_json_path(&self, id: &str) -> PathBuf {
        self.bundle_dir(id).join("bundle.json")
    }

    /// Look up a bundle by its `name:version` pair.
    pub async fn get(&self, name: &BundleName) -> Result<Option<Bundle>> {
        let id = {
            let index = self.index.read().await;
            match index.get(name) {
                Some(id) => id.clone(),
                None => return Ok(None),
            }
        };
        self.get_by_id(&id).await
    }

    /// Look up a bundle directly by its stable id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Bundle>> {
        let path = self.bundle_json_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let bundle: Bundle =
            serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(bundle))
    }

    /// Whether a bundle with this name/version has already been pulled.
    pub async fn exists(&self, name: &BundleName) -> bool {
        self.index.read().await.get(name).is_some()
    }

    /// List every bundle currently tracked. A bundle whose `bundle.json` is
    /// missing is silently skipped (the index entry is stale); any other
    /// read or parse error is surfaced.
    pub async fn list(&self) -> Result<Vec<Bundle>> {
        let ids: Vec<String> = {
            let index = self.index.read().await;
            index
                .0
                .values()
                .flat_map(|versions| versions.values().cloned())
                .collect()
        };
        let mut bundles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bundle) = self.get_by_id(&id).await? {
                bundles.push(bundle);
            }
        }
        Ok(bundles)
    }

    /// Register a newly-assembled bundle under the store: writes its
    /// `bundle.json` and records it in the index.
    pub async fn add_bundle(&self, bundle: Bundle) -> Result<()> {
        let dir = self.bundle_dir(bundle.id());
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(&bundle).context("serialize bundle.json")?;
        let final_path = self.bundle_json_path(bundle.id());
        let tmp_path = final_path.with_extension("json.tmp");
        fs::write(&tmp_path, json).with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path).context("rename bundle.json into place")?;

        let mut index = self.index.write().await;
        index.insert(bundle.name().clone(), bundle.id().clone());
        self.persist_index(&index).await
    }

    /// Delete a single bundle's files and index entry.
    pub async fn delete(&self, name: &BundleName) -> Result<()> {
        let mut index = self.index.write().await;
        if let Some(id) = index.get(name).cloned() {
            let dir = self.bundle_dir(&id);
            if dir.exists() {
                fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
            }
        }
        index.remove(name);
        self.persist_index(&index).await
    }

    /// Remove every tracked bundle (used by `ImageFsInfo`-driven cleanup
    /// and tests).
    pub async fn delete_all(&self) -> Result<()> {
        let mut index = self.index.write().await;
        let bundles_dir = self.root.join("bundles");
        if bundles_dir.exists() {
            fs::remove_dir_all(&bundles_dir).context("remove bundles directory")?;
        }
        *index = BundleIndex::default();
        self.persist_index(&index).await
    }

    async fn persist_index(&self, index: &BundleIndex) -> Result<()> {
        let json = serde_json::to_vec_pretty(index).context("serialize Bundles.json")?;
        let final_path = self.root.join(Self::INDEX_FILE);
        let tmp_path = self.root.join(format!("{}.tmp", Self::INDEX_FILE));
        fs::write(&tmp_path, json).with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path).context("rename Bundles.json into place")
    }
}

/// Absolute path helper shared with the overlay composer and container
/// storage: `<root>/bundles/<id>`.
pub fn bundle_dir(root: &Path, id: &str) -> PathBuf {
    root.join("bundles").join(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Blueprint;
    use tempfile::TempDir;

    fn sample_bundle(id: &str) -> Bundle {
        Bundle {
            id: id.to_string(),
            name: BundleName { name: "nginx".into(), version: "1.0".into() },
            blueprint: Blueprint {
                prefab_id: "prefab".into(),
                blueprint_id: "blueprint".into(),
                layers: vec!["sha256:abc".into()],
            },
            layer_paths: vec![],
            size_bytes: 42,
        }
    }

    #[tokio::test]
    async fn add_and_get_roundtrip() -> Result<()> {
        let dir = TempDir::new()?;
        let store = BundleStore::open(dir.path().to_path_buf()).await?;
        let bundle = sample_bundle("id-1");
        let name = bundle.name().clone();

        store.add_bundle(bundle).await?;

        assert!(store.exists(&name).await);
        let fetched = store.get(&name).await?.expect("bundle present");
        assert_eq!(fetched.id(), "id-1");

        let by_id = store.get_by_id("id-1").await?.expect("bundle present");
        assert_eq!(by_id.name(), &name);
        Ok(())
    }

    #[tokio::test]
    async fn list_skips_missing_bundle_json() -> Result<()> {
        let dir = TempDir::new()?;
        let store = BundleStore::open(dir.path().to_path_buf()).await?;
        store.add_bundle(sample_bundle("id-1")).await?;

        fs::remove_dir_all(store.bundle_dir("id-1"))?;

        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_index_and_files() -> Result<()> {
        let dir = TempDir::new()?;
        let store = BundleStore::open(dir.path().to_path_buf()).await?;
        let bundle = sample_bundle("id-1");
        let name = bundle.name().clone();
        store.add_bundle(bundle).await?;

        store.delete(&name).await?;

        assert!(!store.exists(&name).await);
        assert!(store.get(&name).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reopen_persists_index() -> Result<()> {
        let dir = TempDir::new()?;
        let name = BundleName { name: "nginx".into(), version: "1.0".into() };
        {
            let store = BundleStore::open(dir.path().to_path_buf()).await?;
            store.add_bundle(sample_bundle("id-1")).await?;
        }
        let reopened = BundleStore::open(dir.path().to_path_buf()).await?;
        assert!(reopened.exists(&name).await);
        Ok(())
    }
}
