//! Ecosystem-specific version ordering and constraint semantics.

use std::cmp::Ordering;
use std::fmt;

/// Which ecosystem a package descriptor belongs to, fixing its version
/// comparator. A closed, known-at-compile-time set, so a plain enum dispatch
/// is used rather than a trait object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ecosystem {
    /// PEP-440 (Python package index).
    Python,
    /// `upstream:revision:debian-revision` (OS package manager).
    Debian,
    /// Exact string equality (image/model registries, local sources).
    Exact,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    pub ecosystem: Ecosystem,
    raw: String,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Version {
    pub fn new(ecosystem: Ecosystem, raw: impl Into<String>) -> Self {
        Self {
            ecosystem,
            raw: raw.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Compare two versions of the same ecosystem. Panics if the ecosystems
    /// differ — the solver never compares across ecosystems.
    pub fn compare(&self, other: &Version) -> Ordering {
        assert_eq!(self.ecosystem, other.ecosystem, "cross-ecosystem compare");
        match self.ecosystem {
            Ecosystem::Python => pep440_compare(&self.raw, &other.raw),
            Ecosystem::Debian => debian_compare(&self.raw, &other.raw),
            Ecosystem::Exact => self.raw.cmp(&other.raw),
        }
    }
}

/// A parsed PEP-440 version: epoch, release tuple, and an ordered pre/post/dev
/// marker used only for comparison (local labels are compared separately).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Pep440Key {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(u8, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum LocalSegment {
    Numeric(u64),
    Alpha(String),
}

fn pep440_key(raw: &str) -> Pep440Key {
    let (main, local) = match raw.split_once('+') {
        Some((m, l)) => (m, Some(l)),
        None => (raw, None),
    };

    let (epoch, rest) = match main.split_once('!') {
        Some((e, r)) => (e.parse().unwrap_or(0), r),
        None => (0, main),
    };

    // Split the release segment from trailing pre/post/dev markers.
    let mut release = Vec::new();
    let mut chars = rest.char_indices().peekable();
    let mut cursor = 0;
    while let Some(&(i, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            cursor = i + c.len_utf8();
            chars.next();
        } else {
            break;
        }
    }
    let (release_str, marker_str) = rest.split_at(cursor);
    for part in release_str.split('.') {
        if let Ok(n) = part.parse::<u64>() {
            release.push(n);
        }
    }

    let mut pre = None;
    let mut post = None;
    let mut dev = None;
    let marker = marker_str.trim_start_matches('.').to_lowercase();
    if !marker.is_empty() {
        if let Some(rest) = marker.strip_prefix("post").or_else(|| marker.strip_prefix('.')) {
            post = rest.trim_start_matches('.').parse().ok().or(Some(0));
        } else if let Some(rest) = marker.strip_prefix("dev") {
            dev = rest.parse().ok().or(Some(0));
        } else {
            let (tag, num) = marker.trim_start_matches(|c: char| !c.is_ascii_alphabetic())
                .split_at(marker.find(|c: char| c.is_ascii_digit()).unwrap_or(marker.len()).saturating_sub(
                    marker.len() - marker.trim_start_matches(|c: char| !c.is_ascii_alphabetic()).len(),
                ));
            let rank = match tag {
                t if t.starts_with('a') => 0,
                t if t.starts_with('b') => 1,
                t if t.starts_with("rc") || t.starts_with('c') => 2,
                _ => 2,
            };
            pre = Some((rank, num.parse().unwrap_or(0)));
        }
    }

    let local = local
        .map(|l| {
            l.split(['.', '-', '_'])
                .map(|seg| match seg.parse::<u64>() {
                    Ok(n) => LocalSegment::Numeric(n),
                    Err(_) => LocalSegment::Alpha(seg.to_lowercase()),
                })
                .collect()
        })
        .unwrap_or_default();

    Pep440Key {
        epoch,
        release,
        pre,
        post,
        dev,
        local,
    }
}

fn pep440_compare(a: &str, b: &str) -> Ordering {
    let ka = pep440_key(a);
    let kb = pep440_key(b);

    ka.epoch
        .cmp(&kb.epoch)
        .then_with(|| ka.release.cmp(&kb.release))
        .then_with(|| pre_rank(&ka).cmp(&pre_rank(&kb)))
        .then_with(|| ka.post.cmp(&kb.post))
        .then_with(|| dev_rank(&ka).cmp(&dev_rank(&kb)))
        .then_with(|| ka.local.cmp(&kb.local))
}

/// Pre-release markers sort before the final release; dev sorts before
/// pre-release. This combined rank only matters relative to siblings with
/// the same release tuple, which is the only case PEP-440 defines ordering
/// for pre-releases against.
fn pre_rank(k: &Pep440Key) -> (i8, u64) {
    match k.pre {
        Some((rank, num)) => (rank as i8, num),
        None => (3, 0),
    }
}

fn dev_rank(k: &Pep440Key) -> i64 {
    match k.dev {
        Some(n) => n as i64,
        None => i64::MAX,
    }
}

/// Debian `upstream:revision:debian-revision` comparison: compare the three
/// colon-separated components left to right using Debian's alphanumeric
/// policy (digits compare numerically, letters sort before the empty
/// string, `~` sorts before everything including the empty string).
fn debian_compare(a: &str, b: &str) -> Ordering {
    let pa: Vec<&str> = a.splitn(3, ':').collect();
    let pb: Vec<&str> = b.splitn(3, ':').collect();
    for i in 0..3 {
        let ca = pa.get(i).copied().unwrap_or("");
        let cb = pb.get(i).copied().unwrap_or("");
        match debian_part_compare(ca, cb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn debian_part_compare(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        // Compare non-digit runs char by char under Debian ordering rules.
        while ai.peek().is_some_and(|c| !c.is_ascii_digit())
            || bi.peek().is_some_and(|c| !c.is_ascii_digit())
        {
            let ca = ai.peek().copied();
            let cb = bi.peek().copied();
            if ca.is_none() && cb.is_none() {
                return Ordering::Equal;
            }
            let oa = debian_char_order(ca);
            let ob = debian_char_order(cb);
            match oa.cmp(&ob) {
                Ordering::Equal => {
                    ai.next();
                    bi.next();
                }
                other => return other,
            }
        }
        // Compare digit runs numerically.
        let mut na = String::new();
        while ai.peek().is_some_and(|c| c.is_ascii_digit()) {
            na.push(ai.next().unwrap());
        }
        let mut nb = String::new();
        while bi.peek().is_some_and(|c| c.is_ascii_digit()) {
            nb.push(bi.next().unwrap());
        }
        let va: u64 = na.parse().unwrap_or(0);
        let vb: u64 = nb.parse().unwrap_or(0);
        match va.cmp(&vb) {
            Ordering::Equal => {
                if ai.peek().is_none() && bi.peek().is_none() {
                    return Ordering::Equal;
                }
            }
            other => return other,
        }
    }
}

/// `~` sorts before the empty string, which sorts before everything else;
/// letters sort before non-letters.
fn debian_char_order(c: Option<char>) -> (i32, char) {
    match c {
        None => (-1, '\0'),
        Some('~') => (-2, '~'),
        Some(c) if c.is_ascii_alphabetic() => (0, c),
        Some(c) => (1, c),
    }
}

/// A constraint over a single package's version, evaluated within one
/// ecosystem. Represented as a half-open interval `[min, max)` plus optional
/// exclusions, which is sufficient to express every comparator this
/// component needs (`==`, `>=`, `~=`, wildcard ranges, and exact-string
/// equality for `Ecosystem::Exact`).
#[derive(Clone, Debug)]
pub enum VersionConstraint {
    /// Matches any version.
    Any,
    /// Matches no version (used for an unsatisfiable derived term).
    None,
    /// `[min, max)`. `None` bound means unbounded on that side.
    Range {
        min: Option<Version>,
        max: Option<Version>,
    },
    /// Exact match, for image-registry-style tags or pinned deps.
    Exact(Version),
}

impl VersionConstraint {
    pub fn exact(v: Version) -> Self {
        VersionConstraint::Exact(v)
    }

    pub fn at_least(v: Version) -> Self {
        VersionConstraint::Range {
            min: Some(v),
            max: None,
        }
    }

    /// `~=X.Y.Z` == `[X.Y.Z, X.(Y+1))`.
    pub fn compatible_release(base: Version, next_minor: Version) -> Self {
        VersionConstraint::Range {
            min: Some(base),
            max: Some(next_minor),
        }
    }

    pub fn contains(&self, v: &Version) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::None => false,
            VersionConstraint::Exact(e) => e.ecosystem == v.ecosystem && e.compare(v) == Ordering::Equal,
            VersionConstraint::Range { min, max } => {
                min.as_ref().map_or(true, |m| v.compare(m) != Ordering::Less)
                    && max.as_ref().map_or(true, |m| v.compare(m) == Ordering::Less)
            }
        }
    }

    /// Intersection of two constraints over the same package.
    pub fn intersect(&self, other: &VersionConstraint) -> VersionConstraint {
        match (self, other) {
            (VersionConstraint::None, _) | (_, VersionConstraint::None) => VersionConstraint::None,
            (VersionConstraint::Any, x) | (x, VersionConstraint::Any) => x.clone(),
            (VersionConstraint::Exact(a), b) => {
                if b.contains(a) {
                    VersionConstraint::Exact(a.clone())
                } else {
                    VersionConstraint::None
                }
            }
            (a, VersionConstraint::Exact(b)) => {
                if a.contains(b) {
                    VersionConstraint::Exact(b.clone())
                } else {
                    VersionConstraint::None
                }
            }
            (
                VersionConstraint::Range { min: amin, max: amax },
                VersionConstraint::Range { min: bmin, max: bmax },
            ) => {
                let min = match (amin, bmin) {
                    (Some(a), Some(b)) => Some(if a.compare(b) == Ordering::Less { b.clone() } else { a.clone() }),
                    (Some(a), None) => Some(a.clone()),
                    (None, Some(b)) => Some(b.clone()),
                    (None, None) => None,
                };
                let max = match (amax, bmax) {
                    (Some(a), Some(b)) => Some(if a.compare(b) == Ordering::Greater { b.clone() } else { a.clone() }),
                    (Some(a), None) => Some(a.clone()),
                    (None, Some(b)) => Some(b.clone()),
                    (None, None) => None,
                };
                if let (Some(mn), Some(mx)) = (&min, &max) {
                    if mn.compare(mx) != Ordering::Less {
                        return VersionConstraint::None;
                    }
                }
                VersionConstraint::Range { min, max }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn py(s: &str) -> Version {
        Version::new(Ecosystem::Python, s)
    }

    fn deb(s: &str) -> Version {
        Version::new(Ecosystem::Debian, s)
    }

    #[test]
    fn pep440_release_ordering() {
        assert_eq!(py("1.2.0").compare(&py("1.10.0")), Ordering::Less);
    }

    #[test]
    fn pep440_prerelease_before_release() {
        assert_eq!(py("1.0.0a1").compare(&py("1.0.0")), Ordering::Less);
    }

    #[test]
    fn pep440_dev_before_prerelease() {
        assert_eq!(py("1.0.0.dev1").compare(&py("1.0.0a1")), Ordering::Less);
    }

    #[test]
    fn pep440_post_after_release() {
        assert_eq!(py("1.0.0").compare(&py("1.0.0.post1")), Ordering::Less);
    }

    #[test]
    fn pep440_equal_release_equal() {
        assert_eq!(py("1.0").compare(&py("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn debian_numeric_segments() {
        assert_eq!(deb("1:2.10-1").compare(&deb("1:2.9-1")), Ordering::Greater);
    }

    #[test]
    fn debian_tilde_sorts_before_everything() {
        assert_eq!(deb("1.0~beta1").compare(&deb("1.0")), Ordering::Less);
    }

    #[test]
    fn range_contains() {
        let c = VersionConstraint::Range {
            min: Some(py("1.0")),
            max: Some(py("2.0")),
        };
        assert!(c.contains(&py("1.5")));
        assert!(!c.contains(&py("2.0")));
        assert!(!c.contains(&py("0.9")));
    }

    #[test]
    fn intersect_ranges_narrows() {
        let a = VersionConstraint::at_least(py("1.0"));
        let b = VersionConstraint::Range {
            min: Some(py("0.5")),
            max: Some(py("1.5")),
        };
        let i = a.intersect(&b);
        assert!(i.contains(&py("1.2")));
        assert!(!i.contains(&py("1.6")));
        assert!(!i.contains(&py("0.9")));
    }

    #[test]
    fn intersect_disjoint_is_none() {
        let a = VersionConstraint::Range {
            min: Some(py("2.0")),
            max: None,
        };
        let b = VersionConstraint::Range {
            min: None,
            max: Some(py("1.0")),
        };
        assert!(matches!(a.intersect(&b), VersionConstraint::None));
    }

    #[test]
    fn exact_ecosystem_is_string_equality() {
        let a = Version::new(Ecosystem::Exact, "v1.2.3-rc1");
        let b = Version::new(Ecosystem::Exact, "v1.2.3-rc1");
        assert_eq!(a.compare(&b), Ordering::Equal);
    }
}
