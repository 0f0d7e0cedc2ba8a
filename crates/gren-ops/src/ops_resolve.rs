//! Operation: resolve a project's dependencies against the package cache.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use gren_cache::PackageCache;
use gren_core::manifest::{Constraint, Manifest};
use gren_core::outline::SimplifiedOutline;
use gren_core::package_name::PackageName;
use gren_core::version::{SemanticVersion, SemanticVersionRange};
use gren_core::MANIFEST_FILE;
use gren_resolver::{Requirement, Solution, Solver};
use gren_util::errors::GrenError;

/// A package the solver accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub name: String,
    /// The release whose outline was used.
    pub version: SemanticVersion,
    /// The accepted range after every requirement narrowed it.
    pub range: SemanticVersionRange,
}

/// What `gren resolve` found.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub solution: Solution,
    /// Accepted packages ordered by name. Empty unless the solution is complete.
    pub selected: Vec<Selected>,
}

/// Resolve the dependencies declared in `project_dir/gren.json`.
///
/// Outlines come from local-path dependencies first, then from the cache
/// on demand: every `Missing` verdict is answered with the highest cached
/// version inside the missing range, after which the solver runs again.
///
/// An outline is loaded once, on first sighting, while later requirements
/// keep narrowing its accepted range. A complete solution whose outline
/// fell outside its final range is therefore rechecked: that version is
/// rejected and the next highest cached version inside the range is tried.
/// Stops at the first verdict the cache cannot answer.
pub fn resolve(project_dir: &Path, cache: &PackageCache) -> miette::Result<Resolution> {
    let manifest_path = project_dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(GrenError::Manifest {
            message: format!("No {MANIFEST_FILE} found in {}", project_dir.display()),
        }
        .into());
    }
    let manifest = Manifest::from_path(&manifest_path)?;

    let mut loaded: HashMap<String, SimplifiedOutline> = HashMap::new();
    let mut locals: HashSet<String> = HashSet::new();
    let mut roots = Vec::new();
    for (name, constraint) in manifest.dependencies() {
        let range = match constraint {
            Constraint::Local(path) => {
                let outline = load_local(project_dir, name, path)?;
                let range = outline.version;
                loaded.insert(name.to_string(), outline);
                locals.insert(name.to_string());
                range
            }
            other => other.range().ok_or_else(|| GrenError::Manifest {
                message: format!("{name} has no usable version constraint"),
            })?,
        };
        roots.push(Requirement::new(name, range));
    }
    tracing::debug!("resolving {} root requirements", roots.len());

    let mut rejected: HashMap<String, Vec<SemanticVersion>> = HashMap::new();
    loop {
        let (solution, stale) = {
            let mut solver = Solver::new(&loaded);
            let solution = solver.solve(roots.iter().cloned());
            if solution.is_complete() {
                let selected: Vec<Selected> = solver
                    .accepted()
                    .map(|(name, accepted)| Selected {
                        name: name.to_string(),
                        version: accepted.outline.version.lower(),
                        range: accepted.range,
                    })
                    .collect();
                match selected.iter().find(|s| !s.range.contains(s.version)) {
                    None => return Ok(Resolution { solution, selected }),
                    Some(stale) => (solution, Some(stale.clone())),
                }
            } else {
                (solution, None)
            }
        };

        let (name, range, held) = match (solution, stale) {
            (_, Some(stale)) => (stale.name, stale.range, Some(stale.version)),
            (Solution::Missing { name, version }, None) => (name, version, None),
            (other, None) => {
                return Ok(Resolution {
                    solution: other,
                    selected: Vec::new(),
                })
            }
        };

        if let Some(version) = held {
            tracing::debug!("{name} {version} falls outside its narrowed range {range}");
            let conflict = Solution::Conflict {
                name: name.clone(),
                version1: SemanticVersionRange::exact(version),
                version2: range,
            };
            if locals.contains(&name) {
                return Ok(Resolution {
                    solution: conflict,
                    selected: Vec::new(),
                });
            }
            rejected.entry(name.clone()).or_default().push(version);
            let Some(outline) = load_from_cache(cache, &name, &range, &rejected)? else {
                return Ok(Resolution {
                    solution: conflict,
                    selected: Vec::new(),
                });
            };
            loaded.insert(name, outline);
            continue;
        }

        let Some(outline) = load_from_cache(cache, &name, &range, &rejected)? else {
            tracing::debug!("no cached version of {name} in {range}");
            return Ok(Resolution {
                solution: Solution::Missing {
                    name,
                    version: range,
                },
                selected: Vec::new(),
            });
        };
        loaded.insert(name, outline);
    }
}

/// Load the highest cached version of `name` inside `range` that was not
/// rejected earlier.
fn load_from_cache(
    cache: &PackageCache,
    name: &str,
    range: &SemanticVersionRange,
    rejected: &HashMap<String, Vec<SemanticVersion>>,
) -> miette::Result<Option<SimplifiedOutline>> {
    let package = PackageName::parse(name).map_err(|e| GrenError::Resolution {
        message: e.to_string(),
    })?;
    let excluded = rejected.get(name).map(Vec::as_slice).unwrap_or_default();
    let Some(version) = cache.best_match(&package, range, excluded) else {
        return Ok(None);
    };
    tracing::debug!("loading {name} {version} from the cache");
    Ok(Some(cache.load_outline(&package, version)?))
}

/// Read the package a `local:` dependency points at, relative to the project.
fn load_local(project_dir: &Path, name: &str, path: &Path) -> miette::Result<SimplifiedOutline> {
    let dir = project_dir.join(path);
    let manifest = Manifest::from_path(&dir.join(MANIFEST_FILE))?;
    let Manifest::Package(package) = manifest else {
        return Err(GrenError::Manifest {
            message: format!("{name} points at {}, which is not a package", dir.display()),
        }
        .into());
    };
    if package.name.to_string() != name {
        return Err(GrenError::Manifest {
            message: format!(
                "{name} points at {}, which contains {}",
                dir.display(),
                package.name
            ),
        }
        .into());
    }
    Ok(SimplifiedOutline::from_package(&package)?)
}
