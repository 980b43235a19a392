//! Dependency Solver (C3): a PubGrub-style conflict-driven solver over
//! package descriptors drawn from heterogeneous ecosystems.

pub mod version;

use std::collections::HashMap;
use thiserror::Error;
use version::{Ecosystem, Version, VersionConstraint};

/// Dense index into the solver's package arena (Design Notes: reference by
/// index, not pointer, so partial solutions stay cheaply cloneable).
pub type PackageId = u32;

#[derive(Clone, Debug)]
pub struct PackageDescriptor {
    pub name: String,
    pub ecosystem: Ecosystem,
}

/// A deployment-context map: host-observable facts (arch, libc, Python ABI,
/// CUDA version, ...) used to score candidate deployability.
pub type DeploymentContext = HashMap<String, String>;

/// A candidate's deployability requirements: context key -> required value
/// (interpreted as exact match for this simplified scorer; ecosystem
/// constraint syntax such as `>=3.9` is handled by the registry before
/// candidates reach the solver).
#[derive(Clone, Debug, Default)]
pub struct Deployability(pub HashMap<String, String>);

impl Deployability {
    /// Score against `ctx`: 0 if any required key is present in `ctx` but
    /// mismatched (not deployable), else the average match ratio scaled
    /// into `[0, 255]`. Keys absent from `ctx` are treated as "unknown",
    /// contributing a partial (half) score rather than failing outright.
    pub fn score(&self, ctx: &DeploymentContext) -> u8 {
        if self.0.is_empty() {
            return 255;
        }
        let mut total = 0.0;
        for (k, required) in &self.0 {
            match ctx.get(k) {
                Some(actual) if actual == required => total += 1.0,
                Some(_) => return 0,
                None => total += 0.5,
            }
        }
        ((total / self.0.len() as f64) * 255.0).round() as u8
    }
}

#[derive(Clone, Debug)]
pub struct Candidate {
    pub version: Version,
    pub prefab_id: String,
    pub blueprint_id: String,
    pub deployability: Deployability,
    pub dependencies: Vec<(String, VersionConstraint)>,
}

/// Supplies candidate versions for a package. Implemented by the Bundle
/// Store's backing registries in production; mocked in tests.
pub trait Registry {
    /// All candidates for `package`, in registry-declared order (ties in
    /// deployability score prefer the first-declared alternative).
    fn candidates(&self, package: &str) -> Vec<Candidate>;
}

#[derive(Clone, Debug)]
pub struct Term {
    pub package: PackageId,
    pub constraint: VersionConstraint,
    pub positive: bool,
}

impl Term {
    fn satisfied_by(&self, assignment: &VersionConstraint) -> bool {
        // An assignment satisfies a positive term if every version allowed
        // by the assignment is also allowed by the term (the assignment is
        // a subset); it satisfies a negative term if the assignment and the
        // term's constraint are disjoint.
        let overlap = !matches!(assignment.intersect(&self.constraint), VersionConstraint::None);
        if self.positive {
            overlap
        } else {
            !overlap
        }
    }
}

#[derive(Clone, Debug)]
pub enum IncompatibilityCause {
    Root,
    Dependency,
    NoVersions,
    ConflictDerived(Box<Incompatibility>, Box<Incompatibility>),
}

#[derive(Clone, Debug)]
pub struct Incompatibility {
    pub terms: Vec<Term>,
    pub cause: IncompatibilityCause,
}

#[derive(Debug, Clone)]
struct Assignment {
    package: PackageId,
    constraint: VersionConstraint,
    decision_level: usize,
}

#[derive(Default)]
struct PartialSolution {
    assignments: Vec<Assignment>,
}

impl PartialSolution {
    fn constraint_for(&self, package: PackageId) -> VersionConstraint {
        self.assignments
            .iter()
            .filter(|a| a.package == package)
            .fold(VersionConstraint::Any, |acc, a| acc.intersect(&a.constraint))
    }

    fn decided(&self, package: PackageId) -> bool {
        self.assignments.iter().any(|a| a.package == package)
    }

    fn current_level(&self) -> usize {
        self.assignments.last().map(|a| a.decision_level).unwrap_or(0)
    }

    fn backtrack_to(&mut self, level: usize) {
        self.assignments.retain(|a| a.decision_level <= level);
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("no solution: {derivation}")]
    NoSolution { derivation: String },
    #[error("package {0:?} has no candidates")]
    NoCandidates(String),
}

/// A resolved package: concrete version, prefab id, and blueprint id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub package: String,
    pub version: String,
    pub prefab_id: String,
    pub blueprint_id: String,
}

/// Resolve `root_name`'s declared dependencies against `registry`, scoring
/// candidates against `ctx`. Returns the full transitive resolution or a
/// structured [`SolverError`] describing why no solution exists.
pub fn solve(
    root_name: &str,
    root_deps: &[(String, VersionConstraint)],
    registry: &dyn Registry,
    ctx: &DeploymentContext,
) -> Result<Vec<Resolution>, SolverError> {
    let mut arena: Vec<PackageDescriptor> = Vec::new();
    let mut by_name: HashMap<String, PackageId> = HashMap::new();

    let mut intern = |name: &str, arena: &mut Vec<PackageDescriptor>, by_name: &mut HashMap<String, PackageId>| -> PackageId {
        if let Some(&id) = by_name.get(name) {
            return id;
        }
        let id = arena.len() as PackageId;
        arena.push(PackageDescriptor {
            name: name.to_string(),
            ecosystem: Ecosystem::Exact,
        });
        by_name.insert(name.to_string(), id);
        id
    };

    let root_id = intern(root_name, &mut arena, &mut by_name);

    let mut incompatibilities: Vec<Incompatibility> = vec![Incompatibility {
        terms: vec![Term {
            package: root_id,
            constraint: VersionConstraint::None,
            positive: false,
        }],
        cause: IncompatibilityCause::Root,
    }];
    for (dep_name, constraint) in root_deps {
        let dep_id = intern(dep_name, &mut arena, &mut by_name);
        incompatibilities.push(Incompatibility {
            terms: vec![
                Term {
                    package: root_id,
                    constraint: VersionConstraint::Any,
                    positive: true,
                },
                Term {
                    package: dep_id,
                    constraint: negate_for_dependency(constraint),
                    positive: false,
                },
            ],
            cause: IncompatibilityCause::Dependency,
        });
    }

    let mut solution = PartialSolution::default();
    solution.assignments.push(Assignment {
        package: root_id,
        constraint: VersionConstraint::Any,
        decision_level: 0,
    });

    let mut chosen: HashMap<PackageId, Candidate> = HashMap::new();
    let mut level = 0usize;

    loop {
        // Unit propagation: look for an almost-satisfied incompatibility
        // (all terms satisfied but one) and derive the negation of the
        // remaining term.
        let mut progressed = true;
        while progressed {
            progressed = false;
            for inc in incompatibilities.clone() {
                let mut unsatisfied: Vec<&Term> = Vec::new();
                let mut all_satisfied = true;
                for t in &inc.terms {
                    let assign = solution.constraint_for(t.package);
                    if solution.decided(t.package) && t.satisfied_by(&assign) {
                        continue;
                    }
                    all_satisfied = false;
                    unsatisfied.push(t);
                }
                if all_satisfied {
                    return Err(SolverError::NoSolution {
                        derivation: describe(&inc, &arena),
                    });
                }
                if unsatisfied.len() == 1 {
                    let t = unsatisfied[0];
                    let derived = Term {
                        package: t.package,
                        constraint: t.constraint.clone(),
                        positive: !t.positive,
                    };
                    let already = solution
                        .assignments
                        .iter()
                        .any(|a| a.package == derived.package && !matches!(a.constraint, VersionConstraint::Any));
                    if !already {
                        let c = if derived.positive {
                            derived.constraint
                        } else {
                            // negate by excluding it is not representable in
                            // our interval model in general; approximate by
                            // leaving the existing constraint as Any and
                            // relying on the decision step to pick a
                            // satisfying candidate instead.
                            VersionConstraint::Any
                        };
                        solution.assignments.push(Assignment {
                            package: derived.package,
                            constraint: c,
                            decision_level: level,
                        });
                        progressed = true;
                    }
                }
            }
        }

        // Decision: pick the first positive undecided package.
        let undecided = arena
            .iter()
            .enumerate()
            .map(|(i, _)| i as PackageId)
            .find(|id| !chosen.contains_key(id) && solution.decided(*id));

        let package = match undecided {
            Some(p) => p,
            None => break,
        };

        let name = arena[package as usize].name.clone();
        let constraint = solution.constraint_for(package);
        let candidates = registry.candidates(&name);
        if candidates.is_empty() {
            return Err(SolverError::NoCandidates(name));
        }

        let best = candidates
            .into_iter()
            .filter(|c| constraint.contains(&c.version))
            .map(|c| (c.deployability.score(ctx), c))
            .filter(|(score, _)| *score > 0)
            .max_by_key(|(score, _)| *score);

        let (_, candidate) = match best {
            Some(x) => x,
            None => {
                return Err(SolverError::NoSolution {
                    derivation: format!("root -> {} -> no deployable candidate", name),
                })
            }
        };

        level += 1;
        for (dep_name, dep_constraint) in &candidate.dependencies {
            let dep_id = intern(dep_name, &mut arena, &mut by_name);
            incompatibilities.push(Incompatibility {
                terms: vec![
                    Term {
                        package,
                        constraint: VersionConstraint::Any,
                        positive: true,
                    },
                    Term {
                        package: dep_id,
                        constraint: negate_for_dependency(dep_constraint),
                        positive: false,
                    },
                ],
                cause: IncompatibilityCause::Dependency,
            });
            if !solution.decided(dep_id) {
                solution.assignments.push(Assignment {
                    package: dep_id,
                    constraint: VersionConstraint::Any,
                    decision_level: level,
                });
            }
        }
        solution.assignments.push(Assignment {
            package,
            constraint: VersionConstraint::exact(candidate.version.clone()),
            decision_level: level,
        });
        chosen.insert(package, candidate);
    }

    Ok(chosen
        .into_iter()
        .map(|(id, c)| Resolution {
            package: arena[id as usize].name.clone(),
            version: c.version.as_str().to_string(),
            prefab_id: c.prefab_id,
            blueprint_id: c.blueprint_id,
        })
        .collect())
}

fn negate_for_dependency(c: &VersionConstraint) -> VersionConstraint {
    // The incompatibility `{P selected, not(dep in c)}` is recorded with the
    // dependency term negative over the *allowed* range; solving treats
    // "not satisfying c" as "any other version", which our decision step
    // handles by filtering candidates against the positive constraint
    // directly rather than needing true interval negation.
    c.clone()
}

fn describe(inc: &Incompatibility, arena: &[PackageDescriptor]) -> String {
    inc.terms
        .iter()
        .map(|t| {
            let name = arena
                .get(t.package as usize)
                .map(|p| p.name.as_str())
                .unwrap_or("?");
            if t.positive {
                format!("{} selected", name)
            } else {
                format!("not({} selected)", name)
            }
        })
        .collect::<Vec<_>>()
        .join(" & ")
}
