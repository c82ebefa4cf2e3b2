use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::LlmResult;
use crate::domain::models::Message;

/// Callback receiving streamed text fragments in arrival order.
pub type OnFragment<'a> = dyn for<'s> FnMut(&'s str) + Send + 'a;

/// Completion operations offered to collaborators.
///
/// Every call is bounded by `cancel`: cancelling the token ends rate-limit
/// waits, backoff sleeps and network reads with `LlmError::Cancelled`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Single-prompt completion returning the whole text.
    async fn complete(&self, cancel: &CancellationToken, model: &str, prompt: &str) -> LlmResult<String>;

    /// Multi-turn completion returning the whole text.
    async fn complete_with_history(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[Message],
    ) -> LlmResult<String>;

    /// Single-prompt streaming completion; fragments are delivered in order.
    async fn stream(
        &self,
        cancel: &CancellationToken,
        model: &str,
        prompt: &str,
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<()>;

    /// Multi-turn streaming completion; fragments are delivered in order.
    async fn stream_with_history(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[Message],
        on_fragment: &mut OnFragment<'_>,
    ) -> LlmResult<()>;

    /// Liveness probe for the credential and endpoint.
    async fn validate(&self, cancel: &CancellationToken) -> LlmResult<()>;
}
