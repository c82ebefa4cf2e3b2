use reqwest::header::HeaderMap;

use crate::domain::errors::LlmResult;
use crate::domain::models::{CompletionRequest, CompletionResponse, StreamEvent};

/// A request ready to be posted: target URL, headers and JSON body.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Wire-protocol strategy for one provider family.
///
/// The client only ever calls these three methods; authentication headers,
/// endpoint paths and response shapes stay inside the implementation.
pub trait ProviderTransport: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Encode a normalized request into URL, headers and body bytes.
    fn encode(&self, request: &CompletionRequest) -> LlmResult<EncodedRequest>;

    /// Decode a complete non-streaming response body.
    fn decode_sync(&self, body: &[u8]) -> LlmResult<CompletionResponse>;

    /// Decode the JSON payload of one `data:` line of a streaming response.
    ///
    /// The `data:` prefix and the `[DONE]` sentinel are handled by the caller.
    fn decode_stream_line(&self, payload: &str) -> LlmResult<StreamEvent>;
}
