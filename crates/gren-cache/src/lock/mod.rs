//! Cross-process advisory lock over a cache directory.
//!
//! Holding the lock on `P` means having created the marker directory
//! `P/.lock`. Directory creation either succeeds or fails with "already
//! exists" atomically, which is the only mutual-exclusion primitive used.
//! A holder refreshes the marker's timestamps every [`TOUCH_INTERVAL`]; a
//! marker untouched for longer than [`STALE_AFTER`] belongs to a crashed
//! process and is taken over.
//!
//! [`machine`] holds the pure transition function, [`driver`] runs it against
//! the real filesystem and timers.

pub mod driver;
pub mod fs;
pub mod machine;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use driver::{CacheLock, LockFaults};
pub use fs::{LockFs, StdLockFs};
pub use machine::{LockEffect, LockEvent, LockState, Transition};

/// Name of the marker directory created inside a locked path.
pub const MARKER_DIR: &str = ".lock";

/// A marker not accessed for longer than this is considered abandoned.
pub const STALE_AFTER: Duration = Duration::from_millis(5000);

/// How often a holder refreshes its marker. Must stay well below [`STALE_AFTER`].
pub const TOUCH_INTERVAL: Duration = Duration::from_millis(1000);

/// Consecutive stale-marker takeovers tolerated within one acquisition.
pub const MAX_STALE_RECOVERIES: u32 = 3;

/// Path of the marker directory guarding `path`.
pub fn marker_path(path: &Path) -> PathBuf {
    path.join(MARKER_DIR)
}

/// How long to keep trying while another process holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub between: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, milliseconds_between: u64) -> Self {
        Self {
            attempts,
            between: Duration::from_millis(milliseconds_between),
        }
    }
}

/// What a lock request ended in.
#[derive(Debug)]
pub enum LockOutcome {
    Acquired { path: PathBuf },
    Released { path: PathBuf },
    /// Another live holder owns `path` and the retry budget is spent.
    AlreadyLocked { path: PathBuf },
    /// A filesystem error other than "already exists" while locking or touching.
    UnexpectedError { path: PathBuf, error: io::Error },
}

impl LockOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Acquired { path }
            | Self::Released { path }
            | Self::AlreadyLocked { path }
            | Self::UnexpectedError { path, .. } => path,
        }
    }

    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }
}

impl fmt::Display for LockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquired { path } => write!(f, "Locked {}", path.display()),
            Self::Released { path } => write!(f, "Unlocked {}", path.display()),
            Self::AlreadyLocked { path } => write!(
                f,
                "{} is locked by another process",
                path.display()
            ),
            Self::UnexpectedError { path, error } => {
                write!(f, "Failed to lock {}: {error}", path.display())
            }
        }
    }
}
