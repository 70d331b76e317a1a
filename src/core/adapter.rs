//! Model request adapter: maps catalog model ids to upstream ids, shapes the
//! upstream payload, and performs a single invoke call.

use std::error::Error;
use std::fmt;
use std::string::FromUtf8Error;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::api::models::{resolve_upstream_model, upstream_model_or_default, UnknownModel};
use crate::api::{ApiMessage, InvokeMessage, InvokeRequest, InvokeResponse};
use crate::utils::api_error::summarize_error_body;
use crate::utils::url::{construct_api_url, encode_path_segment};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug)]
pub enum AdapterError {
    /// The model id has no upstream mapping and strict resolution is on.
    UnknownModel(UnknownModel),
    /// The request payload could not be encoded.
    Encode(serde_json::Error),
    /// The request never produced a response.
    Transport(reqwest::Error),
    /// The provider answered with a non-success status.
    Status { status: u16, message: String },
    /// The response body was not valid UTF-8.
    Utf8(FromUtf8Error),
    /// The response body was not valid JSON.
    Json(serde_json::Error),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::UnknownModel(err) => write!(f, "{err}"),
            AdapterError::Encode(err) => write!(f, "Failed to encode request: {err}"),
            AdapterError::Transport(err) => write!(f, "Inference request failed: {err}"),
            AdapterError::Status { status, message } => {
                write!(f, "Inference API returned status {status}: {message}")
            }
            AdapterError::Utf8(err) => write!(f, "Inference response is not UTF-8: {err}"),
            AdapterError::Json(err) => write!(f, "Inference response is not JSON: {err}"),
        }
    }
}

impl Error for AdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AdapterError::UnknownModel(err) => Some(err),
            AdapterError::Encode(err) | AdapterError::Json(err) => Some(err),
            AdapterError::Transport(err) => Some(err),
            AdapterError::Utf8(err) => Some(err),
            AdapterError::Status { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelResolution {
    /// Unknown ids are sent as the fallback upstream model.
    #[default]
    Lenient,
    /// Unknown ids fail with [`AdapterError::UnknownModel`].
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeParams {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Wrap plain-string content as a single text block; block lists pass
/// through unchanged. Roles are copied verbatim.
pub fn shape_messages(messages: Vec<ApiMessage>) -> Vec<InvokeMessage> {
    messages
        .into_iter()
        .map(|message| InvokeMessage {
            role: message.role,
            content: message.content.into_blocks(),
        })
        .collect()
}

pub fn build_request(params: InvokeParams) -> InvokeRequest {
    InvokeRequest {
        anthropic_version: ANTHROPIC_VERSION.to_string(),
        max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages: shape_messages(params.messages),
        system: params.system_prompt,
        temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    }
}

/// Carries an encoded payload to the provider and returns the raw body.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn invoke(&self, upstream_model: &str, body: Vec<u8>) -> Result<Vec<u8>, AdapterError>;
}

/// `POST {base_url}/model/{model}/invoke`, as the Bedrock runtime exposes it.
#[derive(Clone, Debug)]
pub struct HttpInferenceTransport {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpInferenceTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            bearer_token,
        }
    }

    pub fn invoke_url(&self, upstream_model: &str) -> String {
        construct_api_url(
            &self.base_url,
            &format!("model/{}/invoke", encode_path_segment(upstream_model)),
        )
    }
}

#[async_trait]
impl InferenceTransport for HttpInferenceTransport {
    async fn invoke(&self, upstream_model: &str, body: Vec<u8>) -> Result<Vec<u8>, AdapterError> {
        let mut request = self
            .client
            .post(self.invoke_url(upstream_model))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body);
        if let Some(token) = &self.bearer_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(AdapterError::Transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(AdapterError::Transport)?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(AdapterError::Status {
                status: status.as_u16(),
                message: summarize_error_body(&text),
            });
        }

        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutcome {
    pub upstream_model: &'static str,
    pub body: Value,
}

impl InvokeOutcome {
    pub fn response(&self) -> Result<InvokeResponse, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

pub struct ModelRequestAdapter<T> {
    transport: T,
    resolution: ModelResolution,
}

impl<T: InferenceTransport> ModelRequestAdapter<T> {
    pub fn new(transport: T, resolution: ModelResolution) -> Self {
        Self {
            transport,
            resolution,
        }
    }

    pub fn resolve_model(&self, model: &str) -> Result<&'static str, AdapterError> {
        match self.resolution {
            ModelResolution::Lenient => Ok(upstream_model_or_default(model)),
            ModelResolution::Strict => resolve_upstream_model(model).map_err(AdapterError::UnknownModel),
        }
    }

    /// Make one upstream call and return its parsed JSON body. Any failure is
    /// final for this turn; nothing is retried.
    pub async fn generate(&self, params: InvokeParams) -> Result<InvokeOutcome, AdapterError> {
        let upstream_model = self.resolve_model(&params.model)?;
        let request = build_request(params);
        let payload = serde_json::to_vec(&request).map_err(AdapterError::Encode)?;

        debug!(upstream_model, messages = request.messages.len(), "invoking model");
        let started = std::time::Instant::now();
        let raw = self.transport.invoke(upstream_model, payload).await?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "model responded");

        let text = String::from_utf8(raw).map_err(AdapterError::Utf8)?;
        let body = serde_json::from_str(&text).map_err(AdapterError::Json)?;
        Ok(InvokeOutcome {
            upstream_model,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::FALLBACK_UPSTREAM_MODEL;
    use crate::api::{ContentBlock, ImageSource, MessageContent};
    use crate::utils::test_utils::{serve_once, StubResponse};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, Value)>>,
        reply: Vec<u8>,
    }

    impl RecordingTransport {
        fn replying(reply: &[u8]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply: reply.to_vec(),
            }
        }
    }

    #[async_trait]
    impl InferenceTransport for RecordingTransport {
        async fn invoke(&self, upstream_model: &str, body: Vec<u8>) -> Result<Vec<u8>, AdapterError> {
            let payload: Value = serde_json::from_slice(&body).unwrap();
            self.calls
                .lock()
                .unwrap()
                .push((upstream_model.to_string(), payload));
            Ok(self.reply.clone())
        }
    }

    fn params(model: &str, messages: Vec<ApiMessage>) -> InvokeParams {
        InvokeParams {
            model: model.to_string(),
            messages,
            system_prompt: "Be helpful.".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn plain_text_is_wrapped_and_blocks_pass_through() {
        let blocks = vec![
            ContentBlock::text("look"),
            ContentBlock::Image {
                source: ImageSource::base64("image/jpeg", "AAAA"),
            },
        ];
        let shaped = shape_messages(vec![
            ApiMessage::new("user", "Hello"),
            ApiMessage::new("user", MessageContent::Blocks(blocks.clone())),
        ]);
        assert_eq!(shaped[0].content, vec![ContentBlock::text("Hello")]);
        assert_eq!(shaped[1].content, blocks);
    }

    #[test]
    fn roles_are_not_validated() {
        let shaped = shape_messages(vec![ApiMessage::new("narrator", "x")]);
        assert_eq!(shaped[0].role, "narrator");
    }

    #[test]
    fn payload_uses_defaults_and_top_level_system() {
        let request = build_request(params("claude-3-5-haiku-20241022", vec![ApiMessage::new("user", "Hi")]));
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);

        let mut value = serde_json::to_value(&request).unwrap();
        assert!(value.as_object_mut().unwrap().remove("temperature").is_some());
        assert_eq!(
            value,
            json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": 1000,
                "messages": [{"role": "user", "content": [{"type": "text", "text": "Hi"}]}],
                "system": "Be helpful."
            })
        );
    }

    #[test]
    fn explicit_sampling_parameters_override_defaults() {
        let mut p = params("x", Vec::new());
        p.temperature = Some(0.9);
        p.max_tokens = Some(42);
        let request = build_request(p);
        assert_eq!(request.max_tokens, 42);
        assert_eq!(request.temperature, 0.9);
    }

    #[tokio::test]
    async fn lenient_adapter_falls_back_for_unknown_models() {
        let adapter = ModelRequestAdapter::new(
            RecordingTransport::replying(br#"{"content":[]}"#),
            ModelResolution::Lenient,
        );
        let outcome = adapter
            .generate(params("not-a-model", vec![ApiMessage::new("user", "Hi")]))
            .await
            .unwrap();
        assert_eq!(outcome.upstream_model, FALLBACK_UPSTREAM_MODEL);
        let calls = adapter.transport.calls.lock().unwrap();
        assert_eq!(calls[0].0, FALLBACK_UPSTREAM_MODEL);
    }

    #[tokio::test]
    async fn strict_adapter_rejects_unknown_models_before_sending() {
        let adapter = ModelRequestAdapter::new(RecordingTransport::default(), ModelResolution::Strict);
        let err = adapter
            .generate(params("not-a-model", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnknownModel(_)));
        assert!(adapter.transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_json_and_non_utf8_bodies_fail() {
        let adapter = ModelRequestAdapter::new(RecordingTransport::replying(b"<html>"), ModelResolution::Lenient);
        let err = adapter.generate(params("x", Vec::new())).await.unwrap_err();
        assert!(matches!(err, AdapterError::Json(_)));

        let adapter = ModelRequestAdapter::new(RecordingTransport::replying(&[0xff, 0xfe]), ModelResolution::Lenient);
        let err = adapter.generate(params("x", Vec::new())).await.unwrap_err();
        assert!(matches!(err, AdapterError::Utf8(_)));
    }

    #[tokio::test]
    async fn http_transport_posts_json_to_invoke_endpoint() {
        let reply = json!({
            "id": "msg_1",
            "content": [{"type": "text", "text": "Hello!"}],
            "stop_reason": "end_turn"
        });
        let (base_url, server) = serve_once(StubResponse::json(reply.to_string())).await;
        let transport = HttpInferenceTransport::new(reqwest::Client::new(), base_url, Some("tok".into()));
        let adapter = ModelRequestAdapter::new(transport, ModelResolution::Lenient);

        let outcome = adapter
            .generate(params("claude-sonnet-4-20250514", vec![ApiMessage::new("user", "Hi")]))
            .await
            .unwrap();
        assert_eq!(outcome.body, reply);
        assert_eq!(outcome.response().unwrap().text(), "Hello!");

        let captured = server.await.unwrap();
        assert_eq!(
            captured.request_line,
            "POST /model/us.anthropic.claude-sonnet-4-20250514-v1%3A0/invoke HTTP/1.1"
        );
        assert_eq!(captured.header("content-type"), Some("application/json"));
        assert_eq!(captured.header("authorization"), Some("Bearer tok"));
        assert_eq!(captured.json()["anthropic_version"], "bedrock-2023-05-31");
    }

    #[tokio::test]
    async fn http_transport_reports_status_errors() {
        let (base_url, server) = serve_once(
            StubResponse::json(r#"{"message":"Too many requests"}"#).with_status("429 Too Many Requests"),
        )
        .await;
        let transport = HttpInferenceTransport::new(reqwest::Client::new(), base_url, None);
        let adapter = ModelRequestAdapter::new(transport, ModelResolution::Lenient);

        let err = adapter.generate(params("x", Vec::new())).await.unwrap_err();
        match err {
            AdapterError::Status { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Too many requests");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let captured = server.await.unwrap();
        assert!(captured.header("authorization").is_none());
    }
}
