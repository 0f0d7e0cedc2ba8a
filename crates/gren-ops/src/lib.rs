//! Operations behind the `gren` commands.
//!
//! Each `ops_*` module is one command family. Results come back as values;
//! exit codes and error rendering are left to the CLI.

pub mod ops_cache;
pub mod ops_resolve;
