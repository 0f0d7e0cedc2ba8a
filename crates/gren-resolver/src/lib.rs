//! Dependency resolution engine: propagates version ranges through the
//! transitive dependency graph and reports the first missing package or
//! irreconcilable conflict.

pub mod solver;

pub use solver::{solve, Requirement, Solution, Solver};
