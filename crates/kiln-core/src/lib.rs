//! Kiln Core - build file configuration for the Kiln build tool
//!
//! This crate provides the build file types, loading and validation, and
//! detection of the host platform the toolchain defaults are chosen for.

pub mod config;
pub mod error;
pub mod platform;

pub use config::{BuildConfig, Toolchain};
pub use error::{ConfigError, KilnError, Result};
pub use platform::Os;
