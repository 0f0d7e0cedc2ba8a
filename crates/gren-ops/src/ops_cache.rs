//! Operation: inspect and modify the shared package cache.
//!
//! Writes happen under the cache lock so that concurrent gren processes
//! never see a half-copied package.

use std::path::{Path, PathBuf};

use gren_cache::lock::{CacheLock, RetryPolicy};
use gren_cache::PackageCache;
use gren_core::config::GlobalConfig;
use gren_core::package_name::PackageName;
use gren_core::version::SemanticVersion;
use gren_util::errors::GrenError;
use gren_util::fs::{ensure_dir, format_size};
use gren_util::progress::{status, status_warn};

/// Snapshot of the cache for `gren cache stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub root: PathBuf,
    pub packages: usize,
    pub size: u64,
}

/// Copy the package at `src` into the cache.
pub async fn add(
    config: &GlobalConfig,
    src: &Path,
) -> miette::Result<(PackageName, SemanticVersion)> {
    let cache = PackageCache::new(&config.cache_root());
    let src = src.to_path_buf();
    let (name, version) =
        with_cache_lock(config, cache, move |cache| cache.put_local(&src)).await?;
    status("Cached", &format!("{name} {version}"));
    Ok((name, version))
}

/// Remove every cached package. Returns the number of bytes freed.
pub async fn clean(config: &GlobalConfig) -> miette::Result<u64> {
    let cache = PackageCache::new(&config.cache_root());
    let freed = with_cache_lock(config, cache, |cache| cache.clean()).await?;
    status(
        "Cleaned",
        &format!("package cache ({} freed)", format_size(freed)),
    );
    Ok(freed)
}

/// Count and measure the cached packages. Reads only, so no lock is taken.
pub fn stats(config: &GlobalConfig) -> CacheStats {
    let cache = PackageCache::new(&config.cache_root());
    CacheStats {
        root: cache.root().to_path_buf(),
        packages: cache.package_count(),
        size: cache.size(),
    }
}

/// Run `work` on a blocking thread while holding the cache lock.
///
/// The lock driver keeps touching the marker from its own task while `work`
/// runs. A touch failure during `work` is reported after the fact; the
/// work itself is not interrupted.
async fn with_cache_lock<T, W>(
    config: &GlobalConfig,
    cache: PackageCache,
    work: W,
) -> miette::Result<T>
where
    T: Send + 'static,
    W: FnOnce(&PackageCache) -> miette::Result<T> + Send + 'static,
{
    let lock_path = cache.lock_path().to_path_buf();
    ensure_dir(&lock_path).map_err(GrenError::Io)?;

    let retry = RetryPolicy::new(config.lock.retry_attempts, config.lock.retry_interval_ms);
    let (lock, mut faults) = CacheLock::spawn(Some(retry));

    let outcome = lock.acquire(&lock_path).await;
    if !outcome.is_acquired() {
        lock.shutdown().await;
        return Err(GrenError::Lock {
            message: outcome.to_string(),
        }
        .into());
    }
    tracing::debug!("{outcome}");

    let result = tokio::task::spawn_blocking(move || work(&cache))
        .await
        .map_err(|e| GrenError::Generic {
            message: format!("Cache operation did not finish: {e}"),
        });

    if let Some(released) = lock.release(&lock_path).await {
        tracing::debug!("{released}");
    }
    if let Some(fault) = faults.try_recv() {
        status_warn("Warning", &fault.to_string());
    }
    lock.shutdown().await;

    result?
}
