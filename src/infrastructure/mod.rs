//! Infrastructure layer
//!
//! Adapters for the outside world: HTTP providers, configuration sources
//! and log sinks.

pub mod config;
pub mod llm;
pub mod logging;
