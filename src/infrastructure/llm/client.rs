use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::streaming::StreamDecoder;
use super::transport::build_transport;
use crate::domain::errors::{LlmError, LlmResult};
use crate::domain::models::{ClientConfig, CompletionRequest, Message};
use crate::domain::ports::{CompletionClient, OnFragment, ProviderTransport};
use crate::infrastructure::logging::SecretScrubber;

/// Fixed timeout of the liveness probe, independent of the caller's token.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);
const VALIDATE_PROMPT: &str = "ping";
const DEFAULT_VALIDATION_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_COMPAT_VALIDATION_MODEL: &str = "gpt-4o-mini";

/// Completion client for one credential/provider pair
///
/// - Connection pooling and reuse (via `reqwest::Client`)
/// - Fixed-window rate limiting shared by all calls through this instance
/// - Exponential backoff retry for transient errors
/// - Cancellation of waits, backoff and network reads via `CancellationToken`
pub struct LlmClient {
    http_client: ReqwestClient,
    transport: Box<dyn ProviderTransport>,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
    max_tokens: u32,
    validation_model: String,
    scrubber: SecretScrubber,
}

impl LlmClient {
    /// Create a client from configuration
    ///
    /// Selects the transport, validates the credential and builds the HTTP
    /// client. Fails with `MissingCredential` when no key is available.
    ///
    /// # Example
    /// ```no_run
    /// use llmlink::domain::models::ClientConfig;
    /// use llmlink::infrastructure::llm::LlmClient;
    ///
    /// # fn main() -> Result<(), llmlink::domain::errors::LlmError> {
    /// let client = LlmClient::new(ClientConfig::native("sk-ant-..."))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ClientConfig) -> LlmResult<Self> {
        let transport = build_transport(&config)?;
        Self::with_transport(&config, transport)
    }

    /// Create a client around an already constructed transport.
    pub fn with_transport(config: &ClientConfig, transport: Box<dyn ProviderTransport>) -> LlmResult<Self> {
        if config.rate_limit.requests_per_window == 0 || config.rate_limit.window_secs == 0 {
            return Err(LlmError::InvalidConfig(
                "rate limit budget and window must be positive".to_string(),
            ));
        }
        if config.retry.max_attempts == 0 {
            return Err(LlmError::InvalidConfig("max_attempts must be at least 1".to_string()));
        }
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(LlmError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        if config.connect_timeout_secs == 0 || config.request_timeout_secs == 0 {
            return Err(LlmError::InvalidConfig(
                "connect_timeout_secs and request_timeout_secs must be at least 1".to_string(),
            ));
        }

        let http_client = ReqwestClient::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()?;

        let validation_model = config.validation_model.clone().unwrap_or_else(|| {
            match transport.name() {
                "compat" => DEFAULT_COMPAT_VALIDATION_MODEL,
                _ => DEFAULT_VALIDATION_MODEL,
            }
            .to_string()
        });

        let retry_policy = RetryPolicy::from_config(&config.retry);

        info!(
            provider = transport.name(),
            requests_per_window = config.rate_limit.requests_per_window,
            window_secs = config.rate_limit.window_secs,
            max_attempts = retry_policy.max_attempts(),
            request_timeout_secs = config.request_timeout_secs,
            "initialized completion client"
        );

        Ok(Self {
            http_client,
            transport,
            rate_limiter: RateLimiter::new(
                config.rate_limit.requests_per_window,
                config.rate_limit.window(),
            ),
            retry_policy,
            request_timeout: config.request_timeout(),
            max_tokens: config.max_tokens,
            validation_model,
            scrubber: SecretScrubber::new(),
        })
    }

    /// Name of the active transport.
    pub fn provider(&self) -> &'static str {
        self.transport.name()
    }

    #[instrument(skip(self, cancel, prompt), fields(provider = self.provider()))]
    pub async fn complete(&self, cancel: &CancellationToken, model: &str, prompt: &str) -> LlmResult<String> {
        self.run_complete(cancel, model, vec![Message::user(prompt)])
            .await
            .map_err(|e| e.in_operation("complete"))
    }

    #[instrument(skip(self, cancel, messages), fields(provider = self.provider(), turns = messages.len()))]
    pub async fn complete_with_history(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[Message],
    ) -> LlmResult<String> {
        self.run_complete(cancel, model, messages.to_vec())
            .await
            .map_err(|e| e.in_operation("complete_with_history"))
    }

    #[instrument(skip(self, cancel, prompt, on_fragment), fields(provider = self.provider()))]
    pub async fn stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        prompt: &str,
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<()> {
        self.run_stream(cancel, model, vec![Message::user(prompt)], on_fragment)
            .await
            .map_err(|e| e.in_operation("stream"))
    }

    #[instrument(skip(self, cancel, messages, on_fragment), fields(provider = self.provider(), turns = messages.len()))]
    pub async fn stream_with_history(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[Message],
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<()> {
        self.run_stream(cancel, model, messages.to_vec(), on_fragment)
            .await
            .map_err(|e| e.in_operation("stream_with_history"))
    }

    /// Send one minimal request to confirm the credential and endpoint work.
    ///
    /// Single attempt, fixed 10s timeout, response content discarded.
    #[instrument(skip(self, cancel), fields(provider = self.provider()))]
    pub async fn validate(&self, cancel: &CancellationToken) -> LlmResult<()> {
        let request = CompletionRequest::new(
            self.validation_model.clone(),
            vec![Message::user(VALIDATE_PROMPT)],
            1,
            false,
        );

        let probe = async {
            self.rate_limiter.wait(cancel).await?;
            let response = self.send(&request, VALIDATE_TIMEOUT).await?;
            let response = self.check_status(response).await?;
            response.bytes().await.map_err(map_transport_error)?;
            Ok::<(), LlmError>(())
        };

        let result = tokio::select! {
            () = cancel.cancelled() => Err(LlmError::Cancelled),
            result = probe => result,
        };

        match &result {
            Ok(()) => info!("validation succeeded"),
            Err(err) => warn!(error = %err, "validation failed"),
        }
        result.map_err(|e| e.in_operation("validate"))
    }

    async fn run_complete(&self, cancel: &CancellationToken, model: &str, messages: Vec<Message>) -> LlmResult<String> {
        let request = CompletionRequest::new(model, messages, self.max_tokens, false);

        let response = self
            .retry_policy
            .execute(&self.rate_limiter, cancel, |attempt| {
                self.complete_attempt(&request, attempt)
            })
            .await?;

        debug!(chars = response.len(), "completion succeeded");
        Ok(response)
    }

    async fn complete_attempt(&self, request: &CompletionRequest, attempt: u32) -> LlmResult<String> {
        debug!(attempt, "sending completion request");
        let response = self.send(request, self.request_timeout).await?;
        let response = self.check_status(response).await?;
        let body = response.bytes().await.map_err(map_transport_error)?;
        Ok(self.transport.decode_sync(&body)?.text)
    }

    async fn run_stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: Vec<Message>,
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<()> {
        let request = CompletionRequest::new(model, messages, self.max_tokens, true);

        // Retries cover opening the stream; once fragments flow, errors are terminal
        let response = self
            .retry_policy
            .execute(&self.rate_limiter, cancel, |attempt| self.open_stream(&request, attempt))
            .await?;

        // Each chunk read is bounded by the request timeout
        let mut decoder =
            StreamDecoder::new(self.transport.as_ref()).with_idle_timeout(self.request_timeout);
        let fragments = decoder
            .decode(response.bytes_stream(), cancel, on_fragment)
            .await?;

        debug!(fragments, skipped = decoder.skipped(), "stream finished");
        Ok(())
    }

    async fn open_stream(&self, request: &CompletionRequest, attempt: u32) -> LlmResult<Response> {
        debug!(attempt, "opening completion stream");
        let response = tokio::time::timeout(self.request_timeout, self.send(request, Duration::ZERO))
            .await
            .map_err(|_| LlmError::Timeout)??;
        self.check_status(response).await
    }

    /// Post the encoded request; a zero `timeout` leaves the body read unbounded.
    async fn send(&self, request: &CompletionRequest, timeout: Duration) -> LlmResult<Response> {
        let encoded = self.transport.encode(request)?;

        let mut builder = self
            .http_client
            .post(&encoded.url)
            .headers(encoded.headers)
            .body(encoded.body);
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }

        builder.send().await.map_err(map_transport_error)
    }

    async fn check_status(&self, response: Response) -> LlmResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        let body = self.scrubber.scrub_message(&body);

        warn!(status = status.as_u16(), body = %body, "API error response");
        Err(LlmError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(err)
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(&self, cancel: &CancellationToken, model: &str, prompt: &str) -> LlmResult<String> {
        Self::complete(self, cancel, model, prompt).await
    }

    async fn complete_with_history(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[Message],
    ) -> LlmResult<String> {
        Self::complete_with_history(self, cancel, model, messages).await
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        prompt: &str,
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<()> {
        Self::stream(self, cancel, model, prompt, on_fragment).await
    }

    async fn stream_with_history(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[Message],
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<()> {
        Self::stream_with_history(self, cancel, model, messages, on_fragment).await
    }

    async fn validate(&self, cancel: &CancellationToken) -> LlmResult<()> {
        Self::validate(self, cancel).await
    }
}
