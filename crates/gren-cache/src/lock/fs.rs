//! Filesystem operations the lock relies on.

use std::fs::{File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::MARKER_DIR;

/// The filesystem as seen by the lock driver.
///
/// Every method receives the marker directory itself (`<path>/.lock`).
/// Errors must keep their [`io::ErrorKind`]: the state machine tells
/// `AlreadyExists` and `NotFound` apart from everything else.
///
/// Methods run inline on the lock driver task. They must finish in time
/// independent of whatever a foreign process left inside the marker.
pub trait LockFs: Send + 'static {
    /// Create the marker, failing with `AlreadyExists` if it is present.
    /// Must not create missing parents.
    fn create_marker(&self, marker: &Path) -> io::Result<()>;

    /// When the marker was last accessed (or touched).
    fn last_accessed(&self, marker: &Path) -> io::Result<SystemTime>;

    /// Set the marker's access and modification times to `now`.
    fn touch(&self, marker: &Path, now: SystemTime) -> io::Result<()>;

    fn remove_marker(&self, marker: &Path) -> io::Result<()>;

    /// Current time on the clock marker timestamps are compared against.
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// [`LockFs`] on top of `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdLockFs;

impl LockFs for StdLockFs {
    fn create_marker(&self, marker: &Path) -> io::Result<()> {
        std::fs::create_dir(marker)
    }

    fn last_accessed(&self, marker: &Path) -> io::Result<SystemTime> {
        let meta = std::fs::metadata(marker)?;
        meta.accessed().or_else(|_| meta.modified())
    }

    fn touch(&self, marker: &Path, now: SystemTime) -> io::Result<()> {
        set_dir_times(marker, now)
    }

    /// An empty marker is removed in place. A non-empty one is renamed
    /// aside first and its contents deleted on a background thread.
    fn remove_marker(&self, marker: &Path) -> io::Result<()> {
        match std::fs::remove_dir(marker) {
            Err(e) if e.kind() != io::ErrorKind::NotFound && marker.is_dir() => {
                let tombstone = tombstone_path(marker);
                std::fs::rename(marker, &tombstone)?;
                std::thread::spawn(move || {
                    if let Err(e) = std::fs::remove_dir_all(&tombstone) {
                        tracing::warn!("failed to remove {}: {e}", tombstone.display());
                    }
                });
                Ok(())
            }
            other => other,
        }
    }
}

/// A unique sibling of `marker` to move a non-empty marker out of the way.
fn tombstone_path(marker: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    marker.with_file_name(format!(
        "{MARKER_DIR}.{}-{nanos}.stale",
        std::process::id()
    ))
}

/// Set both timestamps of the directory at `dir`.
pub fn set_dir_times(dir: &Path, time: SystemTime) -> io::Result<()> {
    let times = FileTimes::new().set_accessed(time).set_modified(time);
    open_dir(dir)?.set_times(times)
}

#[cfg(not(windows))]
fn open_dir(dir: &Path) -> io::Result<File> {
    File::open(dir)
}

#[cfg(windows)]
fn open_dir(dir: &Path) -> io::Result<File> {
    use std::fs::OpenOptions;
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;
    OpenOptions::new()
        .write(true)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(dir)
}
