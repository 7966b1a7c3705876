use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::prompts::{response_schema, user_text, SYSTEM_PROMPT};
use super::{AiError, OracleOperation, OracleRequest, OracleTransport};

/// Azure OpenAI chat-completions oracle with JSON-schema structured output.
///
/// Vision operations go to `vision_deployment`; `answer_question` carries
/// audio and goes to `audio_deployment`.
pub struct AzureOracleClient {
    endpoint: String,
    api_key: String,
    vision_deployment: String,
    audio_deployment: String,
    api_version: String,
    max_output_tokens: u32,
    timeout: Duration,
    client: Client,
    /// When true, use `Authorization: Bearer` instead of `api-key` header.
    use_bearer: bool,
}

impl AzureOracleClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        vision_deployment: impl Into<String>,
        audio_deployment: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            vision_deployment: vision_deployment.into(),
            audio_deployment: audio_deployment.into(),
            api_version: "2024-10-21".into(),
            max_output_tokens: 1500,
            timeout: Duration::from_secs(30),
            client: Client::new(),
            use_bearer: false,
        }
    }

    /// Build a client from the user's settings.
    pub fn from_settings(settings: &crate::settings::Settings) -> Self {
        let mut client = Self::new(
            &settings.endpoint,
            &settings.api_key,
            &settings.vision_deployment,
            &settings.audio_deployment,
        )
        .with_api_version(&settings.api_version)
        .with_limits(
            settings.max_output_tokens,
            Duration::from_secs(settings.request_timeout_secs),
        );
        if settings.use_bearer {
            client = client.with_bearer();
        }
        client
    }

    /// Create a client that uses Bearer token auth (for Entra ID / AAD).
    pub fn with_bearer(mut self) -> Self {
        self.use_bearer = true;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_limits(mut self, max_output_tokens: u32, timeout: Duration) -> Self {
        self.max_output_tokens = max_output_tokens;
        self.timeout = timeout;
        self
    }

    fn deployment_for(&self, op: OracleOperation) -> &str {
        match op {
            OracleOperation::AnswerQuestion => &self.audio_deployment,
            _ => &self.vision_deployment,
        }
    }

    fn url_for(&self, op: OracleOperation) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment_for(op),
            self.api_version,
        )
    }

    fn build_request_body(&self, request: &OracleRequest) -> Result<Value, AiError> {
        let image = request.image.as_deref().ok_or_else(|| {
            AiError::ModelError(format!("{}: request has no image", request.operation.as_str()))
        })?;

        let mut content = vec![
            json!({ "type": "text", "text": user_text(request) }),
            json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{}", image) }
            }),
        ];
        if let Some(audio) = request.audio.as_deref() {
            content.push(json!({
                "type": "input_audio",
                "input_audio": { "data": audio, "format": "wav" }
            }));
        }

        Ok(json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content }
            ],
            "max_tokens": self.max_output_tokens,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.operation.as_str(),
                    "strict": true,
                    "schema": response_schema(request.operation)
                }
            }
        }))
    }
}

#[async_trait]
impl OracleTransport for AzureOracleClient {
    async fn send(&self, request: &OracleRequest) -> Result<Value, AiError> {
        let url = self.url_for(request.operation);
        let body = self.build_request_body(request)?;

        let mut req = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json");

        req = if self.use_bearer {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        } else {
            req.header("api-key", &self.api_key)
        };

        log::debug!("Oracle request: {} → {}", request.operation.as_str(), url);

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".into());

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(AiError::AuthError(error_body));
            }
            if status.as_u16() == 429 {
                return Err(AiError::RateLimited {
                    retry_after_ms: 1000,
                });
            }
            return Err(AiError::ConnectionError(format!(
                "HTTP {}: {}",
                status, error_body
            )));
        }

        let completion: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("completion is not JSON: {}", e)))?;
        extract_structured_content(&completion)
    }

    fn name(&self) -> &str {
        "azure-openai-oracle"
    }
}

/// Pull the structured JSON object out of a chat-completion response.
fn extract_structured_content(completion: &Value) -> Result<Value, AiError> {
    let message = completion
        .pointer("/choices/0/message")
        .ok_or_else(|| AiError::InvalidResponse("completion has no choices".into()))?;

    if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
        return Err(AiError::ModelError(format!("refused: {}", refusal)));
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| AiError::InvalidResponse("message has no text content".into()))?;

    serde_json::from_str(content.trim())
        .map_err(|e| AiError::InvalidResponse(format!("content is not JSON: {}", e)))
}
