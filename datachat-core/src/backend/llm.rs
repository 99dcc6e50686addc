//! Minimal client for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::BackendError;
use crate::config::BackendConfig;

/// Upper bound on the response body we are willing to buffer (1 MiB).
const MAX_RESPONSE_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One completion request; `None` fields are left to the provider default.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<LlmMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<LlmMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    has_key: bool,
}

impl LlmClient {
    /// Build a client from backend settings.
    ///
    /// A missing API key is not an error here: every call then fails with
    /// [`BackendError::Unauthorized`], which the pipeline reports to the user.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty());
        if let Some(key) = key {
            let auth = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| BackendError::Config("invalid API key format".into()))?;
            headers.insert(AUTHORIZATION, auth);
        }

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| BackendError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            has_key: key.is_some(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Send one chat completion and return the first choice's content.
    pub async fn complete(&self, req: &CompletionRequest) -> Result<String, BackendError> {
        if !self.has_key {
            return Err(BackendError::Unauthorized("API key is not configured".into()));
        }

        let api_req = ChatApiRequest {
            model: &self.model,
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let mut response = self.client.post(self.chat_url()).json(&api_req).send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > MAX_RESPONSE_LEN {
                return Err(BackendError::InvalidResponse(format!(
                    "response larger than {MAX_RESPONSE_LEN} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);
        debug!(status = status.as_u16(), len = bytes.len(), "chat completion response");

        if !status.is_success() {
            let message = serde_json::from_str::<ChatApiResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(match status.as_u16() {
                429 => BackendError::RateLimited { retry_after },
                401 | 403 => BackendError::Unauthorized(message),
                s if s >= 500 => BackendError::Unavailable(message),
                s => BackendError::Provider { status: s, message },
            });
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::InvalidResponse(format!("invalid JSON: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(BackendError::Provider {
                status: status.as_u16(),
                message: error.message.unwrap_or_default(),
            });
        }

        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| BackendError::InvalidResponse("no choices in response".into()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::LlmClient;
    use crate::config::BackendConfig;

    pub(crate) fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    pub(crate) fn client_for(server: &MockServer) -> LlmClient {
        let cfg = BackendConfig {
            base_url: server.uri(),
            api_key: Some("sk-test".into()),
            http_timeout: Duration::from_secs(5),
            ..BackendConfig::default()
        };
        LlmClient::new(&cfg).expect("client")
    }

    /// A server that answers every completion with `content`.
    pub(crate) async fn mock_llm(content: &str) -> (MockServer, LlmClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(reply(content)).mount(&server).await;
        let client = client_for(&server);
        (server, client)
    }
}
