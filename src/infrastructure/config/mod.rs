//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Validation of client and logging settings

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
