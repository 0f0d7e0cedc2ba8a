use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all gren operations.
#[derive(Debug, Error, Diagnostic)]
pub enum GrenError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed `gren.json`.
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your gren.json for syntax errors"))]
    Manifest { message: String },

    /// Dependency resolution did not produce a complete solution.
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// Reading or writing the package cache failed.
    #[error("Package cache error: {message}")]
    Cache { message: String },

    /// The package cache lock could not be taken or kept.
    #[error("Cache lock error: {message}")]
    #[diagnostic(help("Another gren process may be writing to the package cache"))]
    Lock { message: String },

    /// Invalid global configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}
