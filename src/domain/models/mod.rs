pub mod config;
pub mod message;

pub use config::{
    ClientConfig, CompatVendor, Config, LogFormat, LoggingConfig, ProviderKind, RateLimitConfig,
    RetryConfig, RotationPolicy,
};
pub use message::{CompletionRequest, CompletionResponse, Message, Role, StreamEvent};
