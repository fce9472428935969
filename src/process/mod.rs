//! Process module
//!
//! Structured external-process invocation with captured exit status and
//! output.

mod invocation;

pub use invocation::*;
