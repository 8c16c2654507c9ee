use crate::LlmProvider;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use subwatch_core::{CoreError, LlmError};
use tracing::{debug, error};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Replies only need to carry a yes/no.
const MAX_REPLY_TOKENS: u32 = 16;

fn build_http_client() -> Result<Client, CoreError> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| CoreError::Internal {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// Sends `request` and decodes the JSON body, mapping failures to `LlmError`.
async fn send_json<T: for<'de> Deserialize<'de>>(
    provider: &str,
    model: &str,
    request: RequestBuilder,
) -> Result<T, CoreError> {
    let response = request.send().await.map_err(|e| {
        error!("Request to {} failed: {}", provider, e);
        if e.is_timeout() {
            CoreError::Llm(LlmError::RequestTimeout {
                provider: provider.to_string(),
            })
        } else {
            CoreError::Network(e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(CoreError::Llm(status_error(provider, model, status, retry_after)));
    }

    response.json::<T>().await.map_err(|e| {
        error!("Undecodable response from {}: {}", provider, e);
        CoreError::Llm(LlmError::InvalidResponseFormat {
            provider: provider.to_string(),
        })
    })
}

pub(crate) fn status_error(
    provider: &str,
    model: &str,
    status: StatusCode,
    retry_after: Option<u64>,
) -> LlmError {
    let provider = provider.to_string();
    match status.as_u16() {
        401 | 403 => LlmError::InvalidApiKey { provider },
        402 => LlmError::InsufficientCredits { provider },
        // Both providers answer an unknown model with 404.
        404 => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        429 => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(60),
        },
        code if status.is_server_error() => {
            debug!("{} returned server error {}", provider, code);
            LlmError::ServiceUnavailable { provider }
        }
        code => LlmError::RequestFailed {
            provider,
            status_code: code,
        },
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    endpoint: String,
    http_client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Result<Self, CoreError> {
        Ok(Self {
            api_key,
            model,
            endpoint: OPENAI_CHAT_URL.to_string(),
            http_client: build_http_client()?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": MAX_REPLY_TOKENS,
        });

        let request = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);

        let response: ChatCompletionResponse = send_json(self.name(), &self.model, request).await?;
        parse_chat_completion(response, self.name())
    }
}

fn parse_chat_completion(
    response: ChatCompletionResponse,
    provider: &str,
) -> Result<String, CoreError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: provider.to_string(),
            })
        })
}

#[derive(Debug, Serialize, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct ClaudeProvider {
    api_key: String,
    model: String,
    endpoint: String,
    http_client: Client,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: String) -> Result<Self, CoreError> {
        Ok(Self {
            api_key,
            model,
            endpoint: ANTHROPIC_MESSAGES_URL.to_string(),
            http_client: build_http_client()?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_REPLY_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let request = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: MessagesResponse = send_json(self.name(), &self.model, request).await?;
        parse_messages(response, self.name())
    }
}

fn parse_messages(response: MessagesResponse, provider: &str) -> Result<String, CoreError> {
    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: provider.to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_completion() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Yes."}}]
        }))
        .unwrap();
        assert_eq!(parse_chat_completion(response, "openai").unwrap(), "Yes.");

        let empty: ChatCompletionResponse =
            serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_chat_completion(empty, "openai"),
            Err(CoreError::Llm(LlmError::InvalidResponseFormat { .. }))
        ));
    }

    #[test]
    fn test_parse_messages() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "No, not related"}
            ]
        }))
        .unwrap();
        assert_eq!(parse_messages(response, "claude").unwrap(), "No, not related");

        let empty: MessagesResponse = serde_json::from_value(json!({"content": []})).unwrap();
        assert!(parse_messages(empty, "claude").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error("openai", "gpt-4o-mini", StatusCode::UNAUTHORIZED, None),
            LlmError::InvalidApiKey { .. }
        ));
        assert!(matches!(
            status_error("openai", "gpt-4o-mini", StatusCode::TOO_MANY_REQUESTS, Some(7)),
            LlmError::RateLimitExceeded { retry_after: 7, .. }
        ));
        assert!(matches!(
            status_error("claude", "claude-3-5-haiku-latest", StatusCode::SERVICE_UNAVAILABLE, None),
            LlmError::ServiceUnavailable { .. }
        ));
        assert!(matches!(
            status_error("claude", "claude-3-5-haiku-latest", StatusCode::BAD_REQUEST, None),
            LlmError::RequestFailed {
                status_code: 400,
                ..
            }
        ));
        match status_error("openai", "gpt-9", StatusCode::NOT_FOUND, None) {
            LlmError::ModelNotAvailable { model } => assert_eq!(model, "gpt-9"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_provider_names() {
        let openai = OpenAiProvider::new("key".to_string(), "gpt-4o-mini".to_string()).unwrap();
        assert_eq!(openai.name(), "openai");
        assert_eq!(openai.model(), "gpt-4o-mini");

        let claude =
            ClaudeProvider::new("key".to_string(), "claude-3-5-haiku-latest".to_string()).unwrap();
        assert_eq!(claude.name(), "claude");
    }
}
