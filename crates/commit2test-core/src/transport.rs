//! Transport collaborator: opens a streaming request and yields raw chunks.

use std::pin::Pin;

use futures::StreamExt as _;
use tracing::debug;

use crate::config::{GenerationConfig, ProviderFamily};
use crate::errors::ProviderError;

const DEFAULT_CONTENT_BLOCK_MODEL: &str = "claude-3-opus-20240229";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f64 = 0.7;

/// Raw body chunks in arrival order; the stream ends when the transport does.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, ProviderError>> + Send + 'static>>;

/// Everything a transport needs to open one streaming request.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub session_id: uuid::Uuid,
    pub family: ProviderFamily,
    pub model: String,
    pub endpoint: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

impl TransportRequest {
    pub fn from_config(
        session_id: uuid::Uuid,
        config: &GenerationConfig,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            family: config.provider_family,
            model: config.model.clone(),
            endpoint: config.resolved_endpoint().to_string(),
            system_prompt: config.resolved_system_prompt().to_string(),
            user_prompt: user_prompt.into(),
        }
    }
}

/// Source of raw response chunks for a generation session.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the body stream once the provider has
    /// answered with a success status.
    async fn open(&self, request: TransportRequest) -> Result<ChunkStream, ProviderError>;
}

/// Default transport backed by `reqwest` streaming bodies.
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: String,
}

impl HttpTransport {
    /// Builds the HTTP client from the generator configuration.
    pub fn new(config: &GenerationConfig) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ProviderError::transport(
                config.provider_family,
                format!("failed to build HTTP client: {e}"),
            )
        })?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: TransportRequest) -> Result<ChunkStream, ProviderError> {
        let family = request.family;
        let body = build_request_body(&request);
        debug!(session_id = %request.session_id, family = %family, model = %request.model, endpoint = %request.endpoint, "opening provider stream");

        let http_req = self.client.post(&request.endpoint).json(&body);
        let http_req = match family {
            ProviderFamily::DeltaStyle => http_req.bearer_auth(&self.api_key),
            ProviderFamily::ContentBlock => http_req
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        let response = http_req.send().await.map_err(|e| {
            ProviderError::transport(family, format!("request to {} failed: {e}", request.endpoint))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::status(
                family,
                status.as_u16(),
                provider_error_message(&body),
            ));
        }

        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| ProviderError::transport(family, format!("streaming read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }
}

/// Request body for the family's streaming endpoint.
pub(crate) fn build_request_body(request: &TransportRequest) -> serde_json::Value {
    match request.family {
        ProviderFamily::DeltaStyle => serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "stream": true,
        }),
        ProviderFamily::ContentBlock => {
            let model = match request.model.trim() {
                "" => DEFAULT_CONTENT_BLOCK_MODEL,
                model => model,
            };
            serde_json::json!({
                "model": model,
                "max_tokens": MAX_TOKENS,
                "messages": [
                    { "role": "user", "content": request.user_prompt },
                ],
                "system": request.system_prompt,
                "stream": true,
            })
        }
    }
}

/// Pulls `error.message` out of a provider error body, falling back to the raw body.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| match body.trim() {
            "" => "unknown error".to_string(),
            other => other.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(family: ProviderFamily, model: &str) -> TransportRequest {
        let config = GenerationConfig::new(family, "sk-test").model(model);
        TransportRequest::from_config(uuid::Uuid::new_v4(), &config, "prompt body")
    }

    #[test]
    fn delta_style_body_has_system_and_user_messages() {
        let body = build_request_body(&request(ProviderFamily::DeltaStyle, "gpt-4"));
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "prompt body");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn content_block_body_uses_top_level_system_and_default_model() {
        let body = build_request_body(&request(ProviderFamily::ContentBlock, "  "));
        assert_eq!(body["model"], DEFAULT_CONTENT_BLOCK_MODEL);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["system"], crate::prompt::DEFAULT_SYSTEM_PROMPT);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn request_uses_family_default_endpoint() {
        let req = request(ProviderFamily::ContentBlock, "claude");
        assert_eq!(req.endpoint, "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(
            provider_error_message(r#"{"error":{"message":"Incorrect API key"}}"#),
            "Incorrect API key"
        );
        assert_eq!(provider_error_message("gateway timeout"), "gateway timeout");
        assert_eq!(provider_error_message(""), "unknown error");
    }
}
