//! The shared package cache: where fetched packages live on disk, and the
//! advisory lock that keeps concurrent gren processes from writing to it at
//! the same time.

pub mod lock;
pub mod packages;
pub use packages::PackageCache;
