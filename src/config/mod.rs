//! Configuration module for benchmake
//!
//! Provides configuration management including CLI arguments,
//! the project file, and the resolved build configuration.

mod settings;

pub use settings::*;
