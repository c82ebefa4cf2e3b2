//! Messages API transport.
//!
//! Requests carry the conversation as a `messages` array and authenticate
//! with `x-api-key` plus a fixed `anthropic-version` header. Responses hold a
//! top-level `content` array; streams emit typed events where text arrives in
//! `content_block_delta` and the end is signalled by `message_stop`.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{LlmError, LlmResult};
use crate::domain::models::{CompletionRequest, CompletionResponse, Message, StreamEvent};
use crate::domain::ports::{EncodedRequest, ProviderTransport};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaBlock },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaBlock {
    #[serde(rename = "type")]
    delta_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Transport for the Messages API.
pub struct NativeTransport {
    endpoint: String,
    headers: HeaderMap,
}

impl NativeTransport {
    /// Build a transport; fails if the key or version cannot be used as a header.
    pub fn new(base_url: &str, api_key: &str, api_version: &str) -> LlmResult<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| LlmError::InvalidConfig(format!("invalid API key header: {e}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(api_version)
                .map_err(|e| LlmError::InvalidConfig(format!("invalid API version header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            headers,
        })
    }
}

impl ProviderTransport for NativeTransport {
    fn name(&self) -> &'static str {
        "native"
    }

    fn encode(&self, request: &CompletionRequest) -> LlmResult<EncodedRequest> {
        let body = serde_json::to_vec(&MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages: &request.messages,
            stream: request.stream,
        })?;

        Ok(EncodedRequest {
            url: self.endpoint.clone(),
            headers: self.headers.clone(),
            body,
        })
    }

    fn decode_sync(&self, body: &[u8]) -> LlmResult<CompletionResponse> {
        let response: MessagesResponse = serde_json::from_slice(body)?;

        response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(CompletionResponse { text }),
                ContentBlock::Unsupported => None,
            })
            .ok_or_else(|| LlmError::Decode("response contains no text content".to_string()))
    }

    fn decode_stream_line(&self, payload: &str) -> LlmResult<StreamEvent> {
        match serde_json::from_str::<WireEvent>(payload)? {
            WireEvent::ContentBlockDelta { delta } if delta.delta_type == "text_delta" => {
                Ok(StreamEvent::Delta(delta.text))
            }
            WireEvent::MessageStop => Ok(StreamEvent::Terminal),
            WireEvent::Error { error } => Err(LlmError::Decode(format!(
                "stream error event ({}): {}",
                error.error_type, error.message
            ))),
            WireEvent::ContentBlockDelta { .. } | WireEvent::Other => Ok(StreamEvent::Other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn transport() -> NativeTransport {
        NativeTransport::new("https://api.test.com/", "sk-ant-test", "2023-06-01").unwrap()
    }

    #[test]
    fn test_encode_body_and_headers() {
        let request = CompletionRequest::new(
            "claude-sonnet",
            vec![Message::user("Hello"), Message::assistant("Hi"), Message::user("More")],
            256,
            true,
        );

        let encoded = transport().encode(&request).unwrap();
        assert_eq!(encoded.url, "https://api.test.com/v1/messages");
        assert_eq!(encoded.headers["x-api-key"], "sk-ant-test");
        assert_eq!(encoded.headers["anthropic-version"], "2023-06-01");

        let body: Value = serde_json::from_slice(&encoded.body).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-sonnet",
                "max_tokens": 256,
                "messages": [
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hi"},
                    {"role": "user", "content": "More"}
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn test_decode_sync_first_text_block() {
        let body = json!({
            "id": "msg_1",
            "content": [
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "answer"},
                {"type": "text", "text": "ignored"}
            ],
            "usage": {"input_tokens": 1, "output_tokens": 2}
        });

        let response = transport().decode_sync(body.to_string().as_bytes()).unwrap();
        assert_eq!(response.text, "answer");
    }

    #[test]
    fn test_decode_sync_rejects_malformed() {
        assert!(matches!(
            transport().decode_sync(b"<html>"),
            Err(LlmError::Decode(_))
        ));
        assert!(matches!(
            transport().decode_sync(br#"{"content": []}"#),
            Err(LlmError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_stream_events() {
        let t = transport();

        let delta = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#;
        assert_eq!(t.decode_stream_line(delta).unwrap(), StreamEvent::Delta("Hel".into()));

        let json_delta = r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{"}}"#;
        assert_eq!(t.decode_stream_line(json_delta).unwrap(), StreamEvent::Other);

        assert_eq!(
            t.decode_stream_line(r#"{"type":"message_stop"}"#).unwrap(),
            StreamEvent::Terminal
        );
        assert_eq!(t.decode_stream_line(r#"{"type":"ping"}"#).unwrap(), StreamEvent::Other);

        let error = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert!(matches!(t.decode_stream_line(error), Err(LlmError::Decode(msg)) if msg.contains("Overloaded")));
    }

    #[test]
    fn test_rejects_unusable_key() {
        assert!(matches!(
            NativeTransport::new(DEFAULT_BASE_URL, "bad\nkey", "2023-06-01"),
            Err(LlmError::InvalidConfig(_))
        ));
    }
}
