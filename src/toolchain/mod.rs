//! Toolchain module
//!
//! Mutually exclusive compiler/linker profiles (GNU, Intel, NAG) selected
//! by a single discriminant.

mod profile;

pub use profile::*;
