use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for llmlink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Completion client configuration
    #[serde(default)]
    pub client: ClientConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Enable stdout logging
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Log file rotation
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Which wire protocol the client speaks
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Messages API: top-level content array, `x-api-key` authentication
    #[default]
    Native,
    /// Chat Completions API: choices array, bearer authentication
    Compat,
}

/// Backend vendors reachable through the Chat Completions protocol
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompatVendor {
    #[default]
    OpenAi,
    DeepSeek,
    Groq,
    OpenRouter,
    TogetherAi,
    /// Any other compatible server; requires an explicit `base_url`
    Custom,
}

impl CompatVendor {
    /// Base URL including the API path prefix, without trailing slash.
    pub const fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::TogetherAi => Some("https://api.together.xyz/v1"),
            Self::Custom => None,
        }
    }

    /// Environment variable consulted when no `api_key` is configured.
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Custom => "OPENAI_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::TogetherAi => "TOGETHER_API_KEY",
        }
    }

    /// Environment variable that overrides the preset base URL.
    pub const fn base_url_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAi | Self::Custom => Some("OPENAI_BASE_URL"),
            _ => None,
        }
    }
}

/// Request budget shared by every call through one client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests allowed per window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

const fn default_requests_per_window() -> u32 {
    50
}

const fn default_window_secs() -> u64 {
    60
}

impl RateLimitConfig {
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after the first failed attempt, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// HTTP statuses treated as transient
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_retryable_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

/// Completion client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Wire protocol
    #[serde(default)]
    pub provider: ProviderKind,

    /// Vendor preset, only used by the compat protocol
    #[serde(default)]
    pub vendor: CompatVendor,

    /// Credential; falls back to the provider's environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,

    /// `anthropic-version` header sent by the native protocol
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Connection establishment timeout per attempt, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout per attempt, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Output token cap for complete/stream calls
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Model used by the liveness probe
    #[serde(default)]
    pub validation_model: Option<String>,
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_request_timeout_secs() -> u64 {
    120
}

const fn default_max_tokens() -> u32 {
    4096
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            vendor: CompatVendor::default(),
            api_key: None,
            base_url: None,
            api_version: default_api_version(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_tokens: default_max_tokens(),
            validation_model: None,
        }
    }
}

impl ClientConfig {
    /// Native protocol config with an explicit key.
    pub fn native(api_key: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Native,
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Compat protocol config for a vendor preset with an explicit key.
    pub fn compat(vendor: CompatVendor, api_key: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Compat,
            vendor,
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replace the retry settings.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the rate limit settings.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
