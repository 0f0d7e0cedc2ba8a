//! On-disk layout of the shared package cache.

use std::fs;
use std::path::{Path, PathBuf};

use gren_core::manifest::Manifest;
use gren_core::outline::SimplifiedOutline;
use gren_core::package_name::PackageName;
use gren_core::version::{SemanticVersion, SemanticVersionRange};
use gren_core::MANIFEST_FILE;
use gren_util::errors::GrenError;
use gren_util::fs::{copy_dir_all, dir_size, ensure_dir};

/// Package cache at `<cache root>/packages/<author>/<name>/<version>/`.
///
/// The cache root itself is what the cache lock guards; callers take the lock
/// on [`PackageCache::lock_path`] before calling any method that writes.
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
    packages: PathBuf,
}

impl PackageCache {
    pub fn new(cache_root: &Path) -> Self {
        Self {
            root: cache_root.to_path_buf(),
            packages: cache_root.join("packages"),
        }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the cache lock is taken on.
    pub fn lock_path(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, name: &PackageName, version: SemanticVersion) -> PathBuf {
        self.packages
            .join(name.author())
            .join(name.name())
            .join(version.to_string())
    }

    /// Cached versions of `name`, lowest first. Directories that are not a
    /// version or lack a manifest are ignored.
    pub fn versions(&self, name: &PackageName) -> Vec<SemanticVersion> {
        let dir = self.packages.join(name.author()).join(name.name());
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut versions: Vec<SemanticVersion> = entries
            .flatten()
            .filter(|entry| entry.path().join(MANIFEST_FILE).is_file())
            .filter_map(|entry| SemanticVersion::parse(&entry.file_name().to_string_lossy()))
            .collect();
        versions.sort();
        versions
    }

    /// Highest cached version of `name` inside `range`, skipping `excluded`.
    pub fn best_match(
        &self,
        name: &PackageName,
        range: &SemanticVersionRange,
        excluded: &[SemanticVersion],
    ) -> Option<SemanticVersion> {
        self.versions(name)
            .into_iter()
            .rev()
            .find(|version| range.contains(*version) && !excluded.contains(version))
    }

    /// Read the outline of a cached package.
    pub fn load_outline(
        &self,
        name: &PackageName,
        version: SemanticVersion,
    ) -> miette::Result<SimplifiedOutline> {
        let path = self.package_dir(name, version).join(MANIFEST_FILE);
        let manifest = Manifest::from_path(&path)?;
        let Manifest::Package(package) = manifest else {
            return Err(GrenError::Cache {
                message: format!("{} is an application, not a package", path.display()),
            }
            .into());
        };
        if package.name != *name || package.version != version {
            return Err(GrenError::Cache {
                message: format!(
                    "{} declares {} {}, expected {name} {version}",
                    path.display(),
                    package.name,
                    package.version
                ),
            }
            .into());
        }
        Ok(SimplifiedOutline::from_package(&package)?)
    }

    /// Copy the package in `src` into the cache, replacing a cached copy of
    /// the same version. Hold the cache lock while calling this.
    pub fn put_local(&self, src: &Path) -> miette::Result<(PackageName, SemanticVersion)> {
        let manifest = Manifest::from_path(&src.join(MANIFEST_FILE))?;
        let Manifest::Package(package) = manifest else {
            return Err(GrenError::Cache {
                message: format!(
                    "{} is an application; only packages can be cached",
                    src.display()
                ),
            }
            .into());
        };

        let dest = self.package_dir(&package.name, package.version);
        if dest.exists() {
            tracing::debug!("replacing cached {} {}", package.name, package.version);
            fs::remove_dir_all(&dest).map_err(GrenError::Io)?;
        }
        let bytes = copy_dir_all(src, &dest).map_err(|e| GrenError::Cache {
            message: format!("Failed to copy {} into the cache: {e}", src.display()),
        })?;
        tracing::debug!("cached {} ({bytes} bytes) at {}", package.name, dest.display());

        Ok((package.name, package.version))
    }

    /// Every cached `(package, version)`, ordered by name then version.
    pub fn packages(&self) -> Vec<(PackageName, SemanticVersion)> {
        let mut found = Vec::new();
        for author in read_dirs(&self.packages) {
            for project in read_dirs(&author) {
                let full = format!("{}/{}", file_name(&author), file_name(&project));
                let Ok(name) = PackageName::parse(&full) else {
                    continue;
                };
                for version in self.versions(&name) {
                    found.push((name.clone(), version));
                }
            }
        }
        found.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()).then(a.1.cmp(&b.1)));
        found
    }

    pub fn package_count(&self) -> usize {
        self.packages().len()
    }

    /// Total size of cached packages in bytes.
    pub fn size(&self) -> u64 {
        dir_size(&self.packages)
    }

    /// Remove every cached package. Returns the number of bytes freed.
    /// Hold the cache lock while calling this.
    pub fn clean(&self) -> miette::Result<u64> {
        if !self.packages.is_dir() {
            return Ok(0);
        }
        let freed = self.size();
        fs::remove_dir_all(&self.packages).map_err(|e| GrenError::Cache {
            message: format!("Failed to remove {}: {e}", self.packages.display()),
        })?;
        ensure_dir(&self.packages).map_err(GrenError::Io)?;
        Ok(freed)
    }
}

fn read_dirs(path: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(path) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package_json(name: &str, version: &str, deps: &str) -> String {
        format!(
            r#"{{
                "type": "package",
                "platform": "common",
                "name": "{name}",
                "summary": "test package",
                "license": "BSD-3-Clause",
                "version": "{version}",
                "exposed-modules": [],
                "gren-version": "0.4.0 <= v < 0.5.0",
                "dependencies": {{ {deps} }}
            }}"#
        )
    }

    fn write_package(dir: &Path, name: &str, version: &str, deps: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), package_json(name, version, deps)).unwrap();
    }

    fn name(text: &str) -> PackageName {
        PackageName::parse(text).unwrap()
    }

    fn version(text: &str) -> SemanticVersion {
        SemanticVersion::parse(text).unwrap()
    }

    #[test]
    fn layout_follows_author_name_version() {
        let cache = PackageCache::new(Path::new("/cache"));
        assert_eq!(
            cache.package_dir(&name("gren-lang/core"), version("1.2.3")),
            PathBuf::from("/cache/packages/gren-lang/core/1.2.3")
        );
        assert_eq!(cache.lock_path(), Path::new("/cache"));
    }

    #[test]
    fn versions_are_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(tmp.path());
        let base = tmp.path().join("packages/your/first");
        for v in ["2.1.0", "1.5.2", "1.10.0"] {
            write_package(&base.join(v), "your/first", v, "");
        }
        fs::create_dir_all(base.join("not-a-version")).unwrap();
        fs::create_dir_all(base.join("3.0.0")).unwrap();

        assert_eq!(
            cache.versions(&name("your/first")),
            vec![version("1.5.2"), version("1.10.0"), version("2.1.0")]
        );
        assert!(cache.versions(&name("nobody/here")).is_empty());
    }

    #[test]
    fn best_match_picks_highest_in_range() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(tmp.path());
        let base = tmp.path().join("packages/your/first");
        for v in ["1.5.0", "1.5.2", "1.6.0", "2.1.0"] {
            write_package(&base.join(v), "your/first", v, "");
        }

        let range = SemanticVersionRange::parse("1.5.0 <= v < 1.6.0").unwrap();
        assert_eq!(
            cache.best_match(&name("your/first"), &range, &[]),
            Some(version("1.5.2"))
        );
        assert_eq!(
            cache.best_match(&name("your/first"), &range, &[version("1.5.2")]),
            Some(version("1.5.0"))
        );
        let none = SemanticVersionRange::parse("3.0.0 <= v < 4.0.0").unwrap();
        assert_eq!(cache.best_match(&name("your/first"), &none, &[]), None);
    }

    #[test]
    fn load_outline_reads_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(tmp.path());
        write_package(
            &tmp.path().join("packages/my/first/1.1.3"),
            "my/first",
            "1.1.3",
            r#""your/first": "1.5.0 <= v < 1.6.0""#,
        );

        let outline = cache
            .load_outline(&name("my/first"), version("1.1.3"))
            .unwrap();
        assert_eq!(outline.name, name("my/first"));
        assert_eq!(outline.version, SemanticVersionRange::exact(version("1.1.3")));
        assert_eq!(
            outline.dependencies.get("your/first"),
            SemanticVersionRange::parse("1.5.0 <= v < 1.6.0").as_ref()
        );
    }

    #[test]
    fn load_outline_rejects_mismatched_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(tmp.path());
        write_package(
            &tmp.path().join("packages/my/first/1.1.3"),
            "my/first",
            "1.1.4",
            "",
        );
        assert!(cache
            .load_outline(&name("my/first"), version("1.1.3"))
            .is_err());
    }

    #[test]
    fn put_local_copies_and_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("work");
        write_package(&src, "my/first", "1.1.3", "");
        fs::create_dir_all(src.join("src")).unwrap();
        fs::write(src.join("src/Main.gren"), "module Main exposing (..)").unwrap();
        fs::create_dir_all(src.join(".git")).unwrap();

        let cache = PackageCache::new(&tmp.path().join("cache"));
        let (cached, v) = cache.put_local(&src).unwrap();
        assert_eq!(cached, name("my/first"));
        assert_eq!(v, version("1.1.3"));

        let dir = cache.package_dir(&cached, v);
        assert!(dir.join("src/Main.gren").is_file());
        assert!(!dir.join(".git").exists());

        fs::remove_file(src.join("src/Main.gren")).unwrap();
        cache.put_local(&src).unwrap();
        assert!(!dir.join("src/Main.gren").exists());
        assert_eq!(cache.package_count(), 1);
    }

    #[test]
    fn put_local_rejects_applications() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{
                "type": "application",
                "platform": "node",
                "source-directories": ["src"],
                "gren-version": "0.4.5",
                "dependencies": { "direct": {}, "indirect": {} }
            }"#,
        )
        .unwrap();
        let cache = PackageCache::new(&tmp.path().join("cache"));
        assert!(cache.put_local(tmp.path()).is_err());
    }

    #[test]
    fn packages_lists_everything_and_clean_empties() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(tmp.path());
        write_package(&tmp.path().join("packages/your/first/2.1.0"), "your/first", "2.1.0", "");
        write_package(&tmp.path().join("packages/my/first/1.1.3"), "my/first", "1.1.3", "");
        write_package(&tmp.path().join("packages/your/first/1.5.2"), "your/first", "1.5.2", "");

        let listed: Vec<String> = cache
            .packages()
            .iter()
            .map(|(n, v)| format!("{n} {v}"))
            .collect();
        assert_eq!(
            listed,
            vec!["my/first 1.1.3", "your/first 1.5.2", "your/first 2.1.0"]
        );
        assert!(cache.size() > 0);

        let freed = cache.clean().unwrap();
        assert!(freed > 0);
        assert_eq!(cache.package_count(), 0);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn clean_on_missing_cache_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(&tmp.path().join("nothing"));
        assert_eq!(cache.clean().unwrap(), 0);
    }
}
