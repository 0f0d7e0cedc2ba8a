//! Core data types for the gren package manager.
//!
//! This crate defines the values every other gren crate exchanges:
//! semantic versions and version ranges, package names, `gren.json`
//! manifests, the simplified outlines fed to the dependency solver, and the
//! global configuration.
//!
//! This crate is intentionally free of async code and network I/O.

/// File name of a project or package manifest.
pub const MANIFEST_FILE: &str = "gren.json";

pub mod config;
pub mod manifest;
pub mod outline;
pub mod package_name;
pub mod version;
