pub mod client;
pub mod rate_limiter;
pub mod retry;
pub mod streaming;
pub mod transport;

pub use client::LlmClient;
pub use rate_limiter::RateLimiter;
pub use retry::{ErrorClassifier, RetryPolicy};
pub use streaming::{LineOutcome, StreamDecoder};
pub use transport::{build_transport, CompatTransport, NativeTransport};
