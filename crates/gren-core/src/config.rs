use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use gren_util::errors::GrenError;
use gren_util::gren_home;

/// Global user configuration loaded from `<gren home>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub lock: LockConfig,
}

/// Package cache settings from `[cache]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Overrides the cache root. `~/` is expanded to the home directory.
    #[serde(default)]
    pub dir: Option<String>,
}

/// Cache lock contention settings from `[lock]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How many times to retry when another process holds the lock.
    /// `0` gives up on first contention.
    #[serde(default = "default_retry_attempts", rename = "retry-attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_interval_ms", rename = "retry-interval-ms")]
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    10
}

fn default_retry_interval_ms() -> u64 {
    500
}

impl GlobalConfig {
    /// Load the global configuration, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if !path.is_file() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| GrenError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| {
            GrenError::Config {
                message: format!("Failed to parse {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        gren_home().join("config.toml")
    }

    /// Root of the package cache: `[cache] dir` when set, else `<gren home>`.
    pub fn cache_root(&self) -> PathBuf {
        match self.cache.dir.as_deref() {
            Some(dir) => expand_home(dir),
            None => gren_home(),
        }
    }
}

fn expand_home(dir: &str) -> PathBuf {
    match dir.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_else(|_| ".".to_string());
            Path::new(&home).join(rest)
        }
        None => PathBuf::from(dir),
    }
}
