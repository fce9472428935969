//! File system module
//!
//! Artifact lookup, modification times and clean.

mod artifacts;

pub use artifacts::*;
