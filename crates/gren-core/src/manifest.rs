use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use gren_util::errors::GrenError;

use crate::package_name::PackageName;
use crate::version::{SemanticVersion, SemanticVersionRange};

/// The parsed representation of a `gren.json` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Manifest {
    Application(ApplicationManifest),
    Package(PackageManifest),
}

/// Target platform of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Common,
    Browser,
    Node,
}

/// An application: pins every dependency, direct and indirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationManifest {
    pub platform: Platform,
    #[serde(default)]
    pub source_directories: Vec<String>,
    pub gren_version: SemanticVersion,
    #[serde(default)]
    pub dependencies: ApplicationDependencies,
}

/// Dependencies of an application, split by how they were introduced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationDependencies {
    #[serde(default)]
    pub direct: IndexMap<String, Constraint>,
    #[serde(default)]
    pub indirect: IndexMap<String, Constraint>,
}

/// A publishable package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageManifest {
    pub platform: Platform,
    pub name: PackageName,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub license: String,
    pub version: SemanticVersion,
    #[serde(default)]
    pub exposed_modules: ExposedModules,
    pub gren_version: SemanticVersionRange,
    #[serde(default)]
    pub dependencies: IndexMap<String, Constraint>,
}

/// Exposed modules, either as a flat list or grouped under headings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExposedModules {
    List(Vec<String>),
    Grouped(IndexMap<String, Vec<String>>),
}

impl Default for ExposedModules {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl ExposedModules {
    /// All module names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::List(names) => names.iter().map(String::as_str).collect(),
            Self::Grouped(groups) => groups
                .values()
                .flat_map(|names| names.iter().map(String::as_str))
                .collect(),
        }
    }
}

/// A dependency constraint: `"1.2.3"`, `"1.0.0 <= v < 2.0.0"` or `"local:../path"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Exact(SemanticVersion),
    Range(SemanticVersionRange),
    Local(PathBuf),
}

const LOCAL_PREFIX: &str = "local:";

impl Constraint {
    /// The version range this constraint demands. Local paths have none until
    /// the referenced manifest is read.
    pub fn range(&self) -> Option<SemanticVersionRange> {
        match self {
            Self::Exact(version) => Some(SemanticVersionRange::exact(*version)),
            Self::Range(range) => Some(*range),
            Self::Local(_) => None,
        }
    }
}

impl FromStr for Constraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(LOCAL_PREFIX) {
            if path.is_empty() {
                return Err("local dependency needs a path after 'local:'".to_string());
            }
            return Ok(Self::Local(PathBuf::from(path)));
        }
        if let Some(version) = SemanticVersion::parse(s) {
            return Ok(Self::Exact(version));
        }
        SemanticVersionRange::parse(s)
            .map(Self::Range)
            .ok_or_else(|| format!("'{s}' is neither a version, a version range nor a local path"))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(version) => write!(f, "{version}"),
            Self::Range(range) => write!(f, "{range}"),
            Self::Local(path) => write!(f, "{LOCAL_PREFIX}{}", path.display()),
        }
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Manifest {
    /// Load and parse a `gren.json` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GrenError::Manifest {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_str(&content)
    }

    /// Parse a `gren.json` from a string and check every dependency name.
    /// An application may list a package as direct or indirect, not both.
    pub fn from_str(content: &str) -> miette::Result<Self> {
        let manifest: Self = serde_json::from_str(content).map_err(|e| GrenError::Manifest {
            message: format!("Failed to parse gren.json: {e}"),
        })?;
        if let Self::Application(app) = &manifest {
            let deps = &app.dependencies;
            if let Some(name) = deps.direct.keys().find(|n| deps.indirect.contains_key(*n)) {
                return Err(GrenError::Manifest {
                    message: format!("{name} is listed as both a direct and an indirect dependency"),
                }
                .into());
            }
        }
        for name in manifest.dependencies().keys() {
            PackageName::parse(name).map_err(|e| GrenError::Manifest {
                message: e.to_string(),
            })?;
        }
        Ok(manifest)
    }

    /// All declared dependencies in declaration order. For applications the
    /// direct dependencies come before the indirect ones.
    pub fn dependencies(&self) -> IndexMap<&str, &Constraint> {
        match self {
            Self::Application(app) => app
                .dependencies
                .direct
                .iter()
                .chain(&app.dependencies.indirect)
                .map(|(name, constraint)| (name.as_str(), constraint))
                .collect(),
            Self::Package(pkg) => pkg
                .dependencies
                .iter()
                .map(|(name, constraint)| (name.as_str(), constraint))
                .collect(),
        }
    }
}
