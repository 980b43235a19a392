//! Inject OCI lifecycle hooks described by annotations.
//!
//! The full OCI hooks subsystem (cri-o's `hooks.d` directory scan with
//! `when`/`match` filters) is out of scope here; the single mechanism this
//! crate supports is a caller-supplied, already-merged container+pod
//! annotation carrying a JSON-encoded [`Hook`] under a fixed key per
//! lifecycle stage, which is the shape a pod author reaches for with
//! `kubectl annotate` without a cluster-wide hooks directory.

use anyhow::{Context, Result};
use oci_spec::runtime::{Hook, Hooks, HooksBuilder};
use std::collections::HashMap;

const POSTSTART_ANNOTATION: &str = "io.containrs.hooks/poststart";
const POSTSTOP_ANNOTATION: &str = "io.containrs.hooks/poststop";

/// Build the container's `Hooks` from its merged annotations, or `None`
/// when neither hook annotation is present.
pub fn apply(annotations: &HashMap<String, String>) -> Result<Option<Hooks>> {
    let poststart = parse_hook(annotations, POSTSTART_ANNOTATION)?;
    let poststop = parse_hook(annotations, POSTSTOP_ANNOTATION)?;

    if poststart.is_none() && poststop.is_none() {
        return Ok(None);
    }

    let mut builder = HooksBuilder::default();
    if let Some(hook) = poststart {
        builder = builder.poststart(vec![hook]);
    }
    if let Some(hook) = poststop {
        builder = builder.poststop(vec![hook]);
    }
    Ok(Some(builder.build().context("build hooks")?))
}

fn parse_hook(annotations: &HashMap<String, String>, key: &str) -> Result<Option<Hook>> {
    match annotations.get(key) {
        Some(raw) => Ok(Some(serde_json::from_str(raw).with_context(|| format!("parse hook annotation {key}"))?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_annotations_is_none() {
        assert!(apply(&HashMap::new()).unwrap().is_none());
    }

    #[test]
    fn parses_poststart_hook() {
        let mut annotations = HashMap::new();
        annotations.insert(
            POSTSTART_ANNOTATION.to_string(),
            r#"{"path":"/usr/bin/true","args":["true"],"env":[],"timeout":5}"#.to_string(),
        );
        let hooks = apply(&annotations).unwrap().unwrap();
        assert_eq!(hooks.poststart().as_ref().unwrap().len(), 1);
    }
}
