//! The slice of a package manifest the dependency solver needs.

use indexmap::IndexMap;

use gren_util::errors::GrenError;

use crate::manifest::{Constraint, PackageManifest};
use crate::package_name::PackageName;
use crate::version::SemanticVersionRange;

/// A package as seen by the solver: its name, the versions it stands for,
/// and what it requires. Dependencies keep the manifest's declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplifiedOutline {
    pub name: PackageName,
    pub version: SemanticVersionRange,
    pub dependencies: IndexMap<String, SemanticVersionRange>,
}

impl SimplifiedOutline {
    /// Outline of a concrete package release. Local-path dependencies are
    /// only meaningful inside a project and are rejected here.
    pub fn from_package(manifest: &PackageManifest) -> Result<Self, GrenError> {
        let mut dependencies = IndexMap::with_capacity(manifest.dependencies.len());
        for (name, constraint) in &manifest.dependencies {
            let range = match constraint {
                Constraint::Local(path) => {
                    return Err(GrenError::Manifest {
                        message: format!(
                            "{} depends on {name} through local path {}, which published packages cannot do",
                            manifest.name,
                            path.display()
                        ),
                    })
                }
                other => other.range(),
            };
            if let Some(range) = range {
                dependencies.insert(name.clone(), range);
            }
        }

        Ok(Self {
            name: manifest.name.clone(),
            version: SemanticVersionRange::exact(manifest.version),
            dependencies,
        })
    }
}
