//! Shared utilities for the gren package manager.
//!
//! This crate provides cross-cutting concerns used by all other gren crates:
//! error types, filesystem helpers, and terminal status lines.

pub mod errors;
pub mod fs;
pub mod progress;

use std::path::{Path, PathBuf};

/// Returns the gren home directory.
///
/// `GREN_HOME` wins when set; otherwise `~/.cache/gren`.
pub fn gren_home() -> PathBuf {
    if let Some(home) = std::env::var_os("GREN_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".cache").join("gren")
}
