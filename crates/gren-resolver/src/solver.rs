//! Worklist dependency solver.
//!
//! Requirements are processed first-in first-out. The first sighting of a
//! package loads its outline and queues the outline's own dependencies; every
//! later sighting narrows the accepted range by intersection. The run stops at
//! the first package that is not loaded or whose ranges no longer overlap.
//!
//! Which failure is reported depends on the order of the root requirements and
//! of each outline's dependencies. Whether *some* failure is reported does not.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use gren_core::outline::SimplifiedOutline;
use gren_core::version::SemanticVersionRange;

/// A package name together with the versions acceptable for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub range: SemanticVersionRange,
}

impl Requirement {
    pub fn new(name: impl Into<String>, range: SemanticVersionRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

/// Verdict of a solver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solution {
    /// Every reachable requirement is loaded and consistent.
    Complete,
    /// `name` is required in `version` but no outline for it was supplied.
    Missing {
        name: String,
        version: SemanticVersionRange,
    },
    /// `name` was accepted in `version1`, then required in the disjoint `version2`.
    Conflict {
        name: String,
        version1: SemanticVersionRange,
        version2: SemanticVersionRange,
    },
}

impl Solution {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "All dependencies resolved."),
            Self::Missing { name, version } => {
                write!(f, "{name} is required in {version} but is not available")
            }
            Self::Conflict {
                name,
                version1,
                version2,
            } => write!(
                f,
                "{name} is required in both {version1} and {version2}, which do not overlap"
            ),
        }
    }
}

/// An outline the solver accepted, with its range after all narrowing.
#[derive(Debug, Clone, Copy)]
pub struct Accepted<'a> {
    pub outline: &'a SimplifiedOutline,
    pub range: SemanticVersionRange,
}

/// Solver over a fixed set of loaded outlines, keyed by package name.
///
/// Keeps the accepted ranges of the most recent run so callers can report
/// what was selected.
pub struct Solver<'a> {
    loaded: &'a HashMap<String, SimplifiedOutline>,
    solved: BTreeMap<String, Accepted<'a>>,
}

impl<'a> Solver<'a> {
    pub fn new(loaded: &'a HashMap<String, SimplifiedOutline>) -> Self {
        Self {
            loaded,
            solved: BTreeMap::new(),
        }
    }

    /// Propagate `roots` through the loaded outlines.
    pub fn solve(&mut self, roots: impl IntoIterator<Item = Requirement>) -> Solution {
        self.solved.clear();
        let loaded = self.loaded;
        let mut pending: VecDeque<Requirement> = roots.into_iter().collect();

        while let Some(Requirement { name, range }) = pending.pop_front() {
            if let Some(accepted) = self.solved.get_mut(&name) {
                match accepted.range.intersect(&range) {
                    Some(narrowed) => {
                        tracing::debug!("{name}: {} narrowed to {narrowed}", accepted.range);
                        accepted.range = narrowed;
                    }
                    None => {
                        tracing::debug!("{name}: {} conflicts with {range}", accepted.range);
                        return Solution::Conflict {
                            name,
                            version1: accepted.range,
                            version2: range,
                        };
                    }
                }
                continue;
            }

            let Some(outline) = loaded.get(&name) else {
                tracing::debug!("{name}: no outline loaded for {range}");
                return Solution::Missing {
                    name,
                    version: range,
                };
            };

            tracing::debug!(
                "{name}: accepted {range}, queueing {} dependencies",
                outline.dependencies.len()
            );
            pending.extend(
                outline
                    .dependencies
                    .iter()
                    .map(|(dep, dep_range)| Requirement::new(dep.clone(), *dep_range)),
            );
            self.solved.insert(name, Accepted { outline, range });
        }

        Solution::Complete
    }

    /// Accepted packages of the last run, ordered by name.
    pub fn accepted(&self) -> impl Iterator<Item = (&str, &Accepted<'a>)> {
        self.solved.iter().map(|(name, accepted)| (name.as_str(), accepted))
    }
}

/// Solve `roots` against `loaded` in one call.
pub fn solve(
    roots: impl IntoIterator<Item = Requirement>,
    loaded: &HashMap<String, SimplifiedOutline>,
) -> Solution {
    Solver::new(loaded).solve(roots)
}
