//! Chat Completions transport, shared by every OpenAI-compatible vendor.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{LlmError, LlmResult};
use crate::domain::models::{CompletionRequest, CompletionResponse, Message, StreamEvent};
use crate::domain::ports::{EncodedRequest, ProviderTransport};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Transport for `/chat/completions` endpoints with bearer authentication.
pub struct CompatTransport {
    endpoint: String,
    headers: HeaderMap,
}

impl CompatTransport {
    /// `base_url` includes the vendor's API prefix, e.g. `https://api.openai.com/v1`.
    ///
    /// Fails with `InvalidConfig` if the key cannot be sent as a header value.
    pub fn new(base_url: &str, api_key: &str) -> LlmResult<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| LlmError::InvalidConfig(format!("invalid authorization header: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            headers,
        })
    }
}

impl ProviderTransport for CompatTransport {
    fn name(&self) -> &'static str {
        "compat"
    }

    fn encode(&self, request: &CompletionRequest) -> LlmResult<EncodedRequest> {
        let body = serde_json::to_vec(&ChatRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            stream: request.stream,
        })?;

        Ok(EncodedRequest {
            url: self.endpoint.clone(),
            headers: self.headers.clone(),
            body,
        })
    }

    fn decode_sync(&self, body: &[u8]) -> LlmResult<CompletionResponse> {
        let response: ChatResponse = serde_json::from_slice(body)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Decode("response contains no choices".to_string()))?;

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
        })
    }

    fn decode_stream_line(&self, payload: &str) -> LlmResult<StreamEvent> {
        let chunk: ChatChunk = serde_json::from_str(payload)?;

        let content = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content);

        Ok(match content {
            Some(text) if !text.is_empty() => StreamEvent::Delta(text),
            _ => StreamEvent::Other,
        })
    }
}
