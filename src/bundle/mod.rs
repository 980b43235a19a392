//! Bundle data model (C2): the on-disk record of a pulled image and the
//! blueprint it was assembled from.

pub mod assemble;
pub mod overlay;
pub mod store;

use getset::Getters;
use serde::{Deserialize, Serialize};

/// Fully qualified name of a bundle: a package name plus the concrete
/// version the solver resolved it to.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleName {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for BundleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// The immutable recipe a bundle was built from: an ordered list of layer
/// digests (lowest first) plus the prefab and blueprint ids the solver
/// picked it from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub prefab_id: String,
    pub blueprint_id: String,
    pub layers: Vec<String>,
}

/// A bundle: an extracted, ready-to-mount root filesystem plus its
/// identity and provenance. Persisted as `bundle.json` under
/// `<root>/bundles/<id>/`.
#[derive(Clone, Debug, Getters, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[get = "pub"]
pub struct Bundle {
    /// Unique identifier, independent of `name` (names can be retagged).
    id: String,

    /// Name/version pair this bundle was pulled as.
    name: BundleName,

    /// How the bundle was assembled.
    blueprint: Blueprint,

    /// Lower directories (lowest first) ready for `OverlayComposer::compose`.
    layer_paths: Vec<std::path::PathBuf>,

    /// Total size in bytes, as reported to `ImageFsInfo`/`ListImages`.
    size_bytes: u64,
}
