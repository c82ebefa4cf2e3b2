//! Domain errors for the llmlink client layer.

use thiserror::Error;

/// Errors returned by every completion operation.
///
/// Variants fall into the categories the attempt loop cares about:
/// construction (`MissingCredential`, `InvalidConfig`), cancellation,
/// transport (`Transport`, `Timeout`), API (`Api`), decode (`Decode`,
/// `Stream`, `StreamTruncated`) and the wrappers added on the way out
/// (`RetriesExhausted`, `Operation`).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing credential for {provider}: set api_key or {env_var}")]
    MissingCredential {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("stream read error: {0}")]
    Stream(String),

    #[error("stream ended without a terminal event{}", last_error_suffix(.last_error))]
    StreamTruncated { last_error: Option<String> },

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },

    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<LlmError>,
    },
}

pub type LlmResult<T> = Result<T, LlmError>;

impl LlmError {
    /// Wrap this error with the name of the public operation that produced it.
    pub fn in_operation(self, operation: &'static str) -> Self {
        Self::Operation {
            operation,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping `Operation` and `RetriesExhausted` wrappers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Operation { source, .. } | Self::RetriesExhausted { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }

    /// True if the operation ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled)
    }

    /// HTTP status of the underlying API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self.root_cause() {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Attempt count recorded by the retry loop, if retries were exhausted.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            Self::Operation { source, .. } => source.attempts(),
            _ => None,
        }
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|err| format!(" (last error: {err})"))
        .unwrap_or_default()
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
