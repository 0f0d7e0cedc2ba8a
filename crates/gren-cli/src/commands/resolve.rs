//! Resolve command implementation.

use miette::Result;

use gren_cache::PackageCache;
use gren_core::config::GlobalConfig;
use gren_core::MANIFEST_FILE;
use gren_util::errors::GrenError;
use gren_util::fs::find_ancestor_with;
use gren_util::progress::{status, status_info};

pub fn exec() -> Result<()> {
    let cwd = std::env::current_dir().map_err(GrenError::Io)?;
    let project_root =
        find_ancestor_with(&cwd, MANIFEST_FILE).ok_or_else(|| GrenError::Manifest {
            message: format!("Could not find {MANIFEST_FILE} in current or parent directories"),
        })?;

    let config = GlobalConfig::load()?;
    let cache = PackageCache::new(&config.cache_root());
    status_info("Resolving", &project_root.display().to_string());

    let resolution = gren_ops::ops_resolve::resolve(&project_root, &cache)?;
    if !resolution.solution.is_complete() {
        return Err(GrenError::Resolution {
            message: resolution.solution.to_string(),
        }
        .into());
    }

    for selected in &resolution.selected {
        println!("{} {}", selected.name, selected.version);
    }
    status("Resolved", &format!("{} packages", resolution.selected.len()));
    Ok(())
}
