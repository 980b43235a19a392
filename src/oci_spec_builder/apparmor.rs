//! AppArmor profile selection.
//!
//! The CRI security context carries a profile list rather than runtime-spec's
//! single annotation value; only the first entry is meaningful here, mirroring
//! how kubelet only ever sends one.

/// Resolve the `container.apparmor.security.beta.kubernetes.io/<name>`-style
/// profile name into the annotation value the runtime expects, or `None` for
/// `unconfined`/absent.
pub fn apply(profiles: &[String]) -> Option<String> {
    let profile = profiles.first()?;
    if profile.is_empty() || profile == "unconfined" {
        return None;
    }
    Some(profile.clone())
}
