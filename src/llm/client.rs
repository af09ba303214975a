//! OpenAI-compatible LLM client used by the judge panel.
//!
//! Works with any OpenAI-compatible chat completion endpoint, and with
//! Azure OpenAI deployments when an API version is configured.

use crate::config::LlmConfig;
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    /// Azure routes by deployment in the URL and rejects a model field.
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// A language model that turns a fully formatted judge prompt into text.
///
/// The judge panel only depends on this trait, so tests can substitute a
/// scripted model for the HTTP client.
#[async_trait]
pub trait JudgeModel: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Model (or deployment) name this client talks to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn is_azure(&self) -> bool {
        self.config.api_version.is_some()
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        match &self.config.api_version {
            Some(version) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, self.config.model, version
            ),
            None => format!("{}/v1/chat/completions", base),
        }
    }

    /// Send a chat completion request.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: (!self.is_azure()).then(|| self.config.model.clone()),
            messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let builder = self.client.post(self.endpoint());
        let builder = if self.is_azure() {
            builder.header("api-key", &self.config.api_key)
        } else {
            builder.header("Authorization", format!("Bearer {}", self.config.api_key))
        };

        let response = builder
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(EvalError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(EvalError::LlmApi(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        Self::parse_completion(&body)
    }

    /// Text of the first choice. A null content (e.g. a filtered reply) is empty.
    fn parse_completion(body: &str) -> Result<String> {
        let completion: ChatCompletionResponse = serde_json::from_str(body)?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EvalError::LlmApi("No choices in response".to_string()))?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
                "judge completion"
            );
        }

        Ok(choice.message.content.unwrap_or_default())
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        self.chat(messages).await
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let content = self.chat(messages).await?;

        if content.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(EvalError::LlmApi(format!("Unexpected response: {}", content)))
        }
    }
}

#[async_trait]
impl JudgeModel for LlmClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.complete(None, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let sys = Message::system("You are a strict grader.");
        let user = Message::user("Grade this.");

        assert!(matches!(sys.role, Role::System));
        assert!(matches!(user.role, Role::User));
    }

    #[test]
    fn test_endpoint_construction() {
        let config = LlmConfig {
            api_base: "https://api.example.com/".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            ..Default::default()
        };
        let client = LlmClient::new(config);
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");

        // Without trailing slash
        let config2 = LlmConfig {
            api_base: "https://api.example.com".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            ..Default::default()
        };
        let client2 = LlmClient::new(config2);
        assert_eq!(client2.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_azure_endpoint_construction() {
        let config = LlmConfig {
            api_base: "https://myres.openai.azure.com/".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4.1".to_string(),
            api_version: Some("2023-12-01-preview".to_string()),
            ..Default::default()
        };
        let client = LlmClient::new(config);
        assert!(client.is_azure());
        assert_eq!(
            client.endpoint(),
            "https://myres.openai.azure.com/openai/deployments/gpt-4.1/chat/completions?api-version=2023-12-01-preview"
        );
    }

    #[test]
    fn test_azure_request_omits_model() {
        let request = ChatCompletionRequest {
            model: None,
            messages: vec![Message::user("hi")],
            max_tokens: Some(16),
            temperature: Some(0.0),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_null_content_parses_as_empty() {
        let body = r#"{"choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]}"#;
        assert_eq!(LlmClient::parse_completion(body).unwrap(), "");
    }

    #[test]
    fn test_parse_completion_with_usage() {
        let body = r#"{
            "choices": [{"message": {"content": "LABEL: relevant"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 4, "total_tokens": 124}
        }"#;
        assert_eq!(LlmClient::parse_completion(body).unwrap(), "LABEL: relevant");

        let err = LlmClient::parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, EvalError::LlmApi(_)));
    }
}
