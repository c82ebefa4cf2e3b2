//! llmlink - resilient LLM client layer
//!
//! A small client for text-completion providers that absorbs the usual
//! failure modes of hosted model APIs: per-client rate limiting, retries
//! with capped exponential backoff, cancellation at every suspension point,
//! and incremental decoding of server-sent event streams.
//!
//! Two wire dialects are supported:
//!
//! - **Native**: the Messages API (`x-api-key` auth, `/v1/messages`)
//! - **Compat**: OpenAI-compatible chat completions (bearer auth,
//!   `/chat/completions`), with presets for common vendors
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and ports
//! - **Infrastructure Layer** (`infrastructure`): HTTP client, transports,
//!   configuration loading and logging
//!
//! # Example
//!
//! ```no_run
//! use llmlink::{ClientConfig, LlmClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = LlmClient::new(ClientConfig::native(std::env::var("ANTHROPIC_API_KEY")?))?;
//!     let cancel = CancellationToken::new();
//!
//!     let reply = client
//!         .complete(&cancel, "claude-3-5-sonnet-latest", "Say hello")
//!         .await?;
//!     println!("{reply}");
//!
//!     client
//!         .stream(&cancel, "claude-3-5-sonnet-latest", "Count to five", &mut |fragment| {
//!             print!("{fragment}");
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::errors::{LlmError, LlmResult};
pub use domain::models::{
    ClientConfig, CompatVendor, CompletionRequest, CompletionResponse, Config, LogFormat,
    LoggingConfig, Message, ProviderKind, RateLimitConfig, RetryConfig, Role, RotationPolicy,
    StreamEvent,
};
pub use domain::ports::{CompletionClient, EncodedRequest, OnFragment, ProviderTransport};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::llm::{
    CompatTransport, ErrorClassifier, LlmClient, NativeTransport, RateLimiter, RetryPolicy,
};
pub use infrastructure::logging::LoggerImpl;
