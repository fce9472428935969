//! Progress reporting module
//!
//! Per-step spinners and status lines for a build.

mod reporter;

pub use reporter::*;
