//! Image assembly: ties the Pull Coalescer (C7) to the Dependency Solver
//! (C3) and the layer inputs the Overlay Composer (C4) later mounts,
//! producing a ready [`Bundle`] for both `PullImage` and `CreateContainer`'s
//! image-ensure step.
//!
//! The registry this solves against resolves a bare image reference to a
//! single candidate with no further dependencies: fetching a manifest and
//! its layer blobs from a remote registry is the network collaborator this
//! component hands off to, out of scope here the same way `network::cni`
//! leaves the actual CNI plugin invocation to an external binary.

use crate::{
    bundle::{store::BundleStore, Blueprint, Bundle, BundleName},
    pull_coalescer::{PullCoalescer, PullKey},
    solver::{
        self,
        version::{Ecosystem, Version, VersionConstraint},
        Candidate, Deployability, DeploymentContext, Registry,
    },
};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Splits `name[:tag]` into a [`BundleName`], defaulting the tag to
/// `latest` as every OCI-compatible registry reference does.
pub fn parse_ref(image: &str) -> BundleName {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.is_empty() && !tag.contains('/') => BundleName {
            name: name.to_string(),
            version: tag.to_string(),
        },
        _ => BundleName {
            name: image.to_string(),
            version: "latest".to_string(),
        },
    }
}

/// Resolves exactly one candidate for the image it was built for, with no
/// declared dependencies.
struct ImageRegistry {
    name: BundleName,
}

impl Registry for ImageRegistry {
    fn candidates(&self, package: &str) -> Vec<Candidate> {
        if package != self.name.name {
            return Vec::new();
        }
        vec![Candidate {
            version: Version::new(Ecosystem::Exact, self.name.version.clone()),
            prefab_id: format!("{}-{}", self.name.name, self.name.version),
            blueprint_id: format!("{}-{}", self.name.name, self.name.version),
            deployability: Deployability::default(),
            dependencies: Vec::new(),
        }]
    }
}

/// Ensure `image` has a bundle assembled in `bundle_store`, coalescing
/// concurrent requests for the same (image, sandbox cgroup, namespace)
/// through `pull_coalescer`. Returns the bundle id.
pub async fn ensure_image(
    bundle_store: &BundleStore,
    pull_coalescer: &PullCoalescer,
    image_volumes_root: &Path,
    image: &str,
    sandbox_cgroup: &str,
    namespace: &str,
    ctx: &DeploymentContext,
) -> Result<String, String> {
    let key = PullKey {
        image: image.to_string(),
        sandbox_cgroup: sandbox_cgroup.to_string(),
        namespace: namespace.to_string(),
    };
    let name = parse_ref(image);

    pull_coalescer
        .coalesce(key, async move { assemble(bundle_store, image_volumes_root, &name, ctx).await })
        .await
}

async fn assemble(
    bundle_store: &BundleStore,
    image_volumes_root: &Path,
    name: &BundleName,
    ctx: &DeploymentContext,
) -> Result<String, String> {
    if let Some(existing) = bundle_store.get(name).await.map_err(|e| e.to_string())? {
        return Ok(existing.id().clone());
    }

    let registry = ImageRegistry { name: name.clone() };
    let root_constraint = VersionConstraint::exact(Version::new(Ecosystem::Exact, name.version.clone()));
    let resolutions = solver::solve(&name.name, &[(name.name.clone(), root_constraint)], &registry, ctx)
        .map_err(|e| e.to_string())?;
    let resolved = resolutions
        .first()
        .ok_or_else(|| format!("solver returned no resolution for {name}"))?;

    let mut layers = Vec::with_capacity(resolutions.len());
    let mut layer_paths = Vec::with_capacity(resolutions.len());
    for resolution in &resolutions {
        let layer_dir = image_volumes_root.join(&resolution.prefab_id);
        tokio::fs::create_dir_all(&layer_dir).await.map_err(|e| e.to_string())?;
        layers.push(resolution.prefab_id.clone());
        layer_paths.push(layer_dir);
    }

    let bundle = Bundle {
        id: Uuid::new_v4().to_string(),
        name: name.clone(),
        blueprint: Blueprint {
            prefab_id: resolved.prefab_id.clone(),
            blueprint_id: resolved.blueprint_id.clone(),
            layers,
        },
        layer_paths,
        size_bytes: 0,
    };
    let id = bundle.id.clone();
    bundle_store.add_bundle(bundle).await.map_err(|e| e.to_string())?;
    Ok(id)
}
