//! HTTP model backends
//!
//! One client covering the two supported wire styles: OpenAI-style chat
//! completions and Anthropic-style messages. The model is instructed to
//! answer with result JSON only; whatever comes back is re-validated by
//! `parse_model_output` before leaving this module.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{parse_model_output, ModelClient, ModelOutput, ModelPrompt};
use crate::config::ModelCredentials;
use crate::error::{ComplianceError, ModelError, Result};

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Wire style spoken by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiStyle {
    OpenAiChat,
    AnthropicMessages,
}

/// Model client over HTTP
pub struct HttpModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    style: ApiStyle,
    name: &'static str,
    timeout_secs: u64,
}

impl HttpModelClient {
    /// Client for an OpenAI-compatible chat-completions endpoint
    pub fn openai(credentials: &ModelCredentials, timeout: Duration) -> Result<Self> {
        Self::build(credentials, timeout, ApiStyle::OpenAiChat, OPENAI_DEFAULT_BASE, "openai")
    }

    /// Client for an Anthropic-style messages endpoint
    pub fn anthropic(credentials: &ModelCredentials, timeout: Duration) -> Result<Self> {
        Self::build(
            credentials,
            timeout,
            ApiStyle::AnthropicMessages,
            ANTHROPIC_DEFAULT_BASE,
            "anthropic",
        )
    }

    fn build(
        credentials: &ModelCredentials,
        timeout: Duration,
        style: ApiStyle,
        default_base: &str,
        name: &'static str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ComplianceError::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = credentials
            .base_url
            .clone()
            .unwrap_or_else(|| default_base.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            base_url,
            api_key: credentials.api_key.clone(),
            model: credentials.model.clone(),
            style,
            name,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn invoke_openai(&self, prompt: &ModelPrompt) -> std::result::Result<String, ModelError> {
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let response = check_status(response).await?;
        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ModelError::MalformedOutput {
                reason: format!("invalid chat-completions envelope: {}", e),
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ModelError::MalformedOutput {
                reason: "response contained no choices".into(),
            })
    }

    async fn invoke_anthropic(
        &self,
        prompt: &ModelPrompt,
    ) -> std::result::Result<String, ModelError> {
        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }
        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: String,
        }

        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "system": prompt.system,
            "messages": [
                {"role": "user", "content": prompt.user},
            ],
        });

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let response = check_status(response).await?;
        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            ModelError::MalformedOutput {
                reason: format!("invalid messages envelope: {}", e),
            }
        })?;

        let text: String = parsed.content.into_iter().map(|b| b.text).collect();
        if text.is_empty() {
            return Err(ModelError::MalformedOutput {
                reason: "response contained no text blocks".into(),
            });
        }
        Ok(text)
    }
}

fn map_send_error(e: reqwest::Error, timeout_secs: u64) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout { timeout_secs }
    } else {
        ModelError::Transport(e.to_string())
    }
}

async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(300)
        .collect();

    Err(match status.as_u16() {
        401 | 403 => ModelError::Auth(format!("{}: {}", status, detail)),
        400 | 404 | 422 => ModelError::BadRequest(format!("{}: {}", status, detail)),
        429 => ModelError::RateLimited(detail),
        s if s >= 500 => ModelError::Transport(format!("{}: {}", status, detail)),
        _ => ModelError::Backend(format!("{}: {}", status, detail)),
    })
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn invoke(&self, prompt: &ModelPrompt) -> std::result::Result<ModelOutput, ModelError> {
        let text = match self.style {
            ApiStyle::OpenAiChat => self.invoke_openai(prompt).await?,
            ApiStyle::AnthropicMessages => self.invoke_anthropic(prompt).await?,
        };

        tracing::debug!(
            backend = self.name,
            model = %self.model,
            bytes = text.len(),
            "Model response received"
        );
        parse_model_output(&text)
    }

    fn name(&self) -> &str {
        self.name
    }
}
