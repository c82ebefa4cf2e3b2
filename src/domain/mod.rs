//! Domain layer
//!
//! Provider-neutral models, the error taxonomy and the ports that
//! infrastructure adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{LlmError, LlmResult};
