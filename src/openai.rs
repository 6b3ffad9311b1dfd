//! OpenAI chat-completions backend.

use crate::config::Config;
use crate::driver::{BackendResponse, TranslationBackend};
use crate::error::BackendError;
use crate::job::{Job, Translations};
use crate::retry::{with_retry_if, RetryConfig};
use crate::tokens::{CharEstimator, TokenEstimator};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Usage {
    completion_tokens: usize,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

/// Translation backend that sends each batch as one JSON-mode chat completion.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_input_tokens: usize,
    retry: RetryConfig,
}

impl OpenAiBackend {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.openai_api_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            temperature: config.openai_temperature,
            max_input_tokens: config.input_budget()?,
            retry: RetryConfig::api_call(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, prompt: &str, job: &Job) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: job.payload(),
                },
            ],
            temperature: if is_reasoning_model(&self.model) {
                None
            } else {
                Some(self.temperature)
            },
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<BackendResponse, BackendError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(BackendError::Api { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(BackendError::EmptyResponse)?;

        let output_tokens = match chat_response.usage {
            Some(usage) => usage.completion_tokens,
            None => CharEstimator::default().count_tokens(&content),
        };

        let value: serde_json::Value = serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;
        let translations = Translations::from_response(&value).ok_or_else(|| {
            BackendError::MalformedResponse("expected a JSON object at the top level".to_string())
        })?;

        Ok(BackendResponse {
            translations,
            output_tokens,
        })
    }
}

/// Models occasionally wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[async_trait]
impl TranslationBackend for OpenAiBackend {
    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    async fn translate(&self, prompt: &str, job: &Job) -> Result<BackendResponse, BackendError> {
        let request = self.build_request(prompt, job);
        debug!("Sending {} keys to {}", job.len(), self.model);

        with_retry_if(
            &self.retry,
            &format!("Translation of {} keys", job.len()),
            || self.complete(&request),
            BackendError::is_transient,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MODEL;
    use crate::job::{KeyRecord, Text};
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    // ==================== Helper Functions ====================

    fn create_test_config(api_url: &str) -> Config {
        Config {
            openai_api_key: "test-openai-key".to_string(),
            openai_model: DEFAULT_MODEL.to_string(),
            openai_api_url: api_url.to_string(),
            openai_temperature: 0.2,
            request_timeout_secs: 10,
            max_input_tokens: Some(4000),
        }
    }

    fn create_backend(server: &MockServer) -> OpenAiBackend {
        let config = create_test_config(&format!("{}/v1/chat/completions", server.uri()));
        OpenAiBackend::from_config(&config)
            .expect("backend should build")
            .with_retry(RetryConfig::immediate(3))
    }

    fn create_openai_response(content: &str, completion_tokens: Option<usize>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }
            ]
        });
        if let Some(tokens) = completion_tokens {
            body["usage"] = serde_json::json!({
                "prompt_tokens": 100,
                "completion_tokens": tokens,
                "total_tokens": 100 + tokens
            });
        }
        body
    }

    fn support_job() -> Job {
        Job::new().with(
            "support",
            KeyRecord::new().with("en", "Support").with_missing("ru"),
        )
    }

    // ==================== Request Structure Tests ====================

    #[test]
    fn test_request_serialization() {
        let config = create_test_config(crate::config::DEFAULT_API_URL);
        let backend = OpenAiBackend::from_config(&config).unwrap();
        let request = backend.build_request("Translate this", &support_job());

        let json = serde_json::to_value(&request).expect("Should serialize");
        assert_eq!(json["model"], DEFAULT_MODEL);
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "Translate this");
        assert_eq!(
            json["messages"][1]["content"],
            r#"{"support":{"en":"Support","ru":null}}"#
        );
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_reasoning_model_omits_temperature() {
        let mut config = create_test_config(crate::config::DEFAULT_API_URL);
        config.openai_model = "o4-mini".to_string();
        let backend = OpenAiBackend::from_config(&config).unwrap();

        let json = serde_json::to_string(&backend.build_request("p", &support_job())).unwrap();
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_is_reasoning_model() {
        assert!(is_reasoning_model("gpt-5-mini"));
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("o3"));
        assert!(!is_reasoning_model("gpt-4o-mini-2024-07-18"));
        assert!(!is_reasoning_model("gpt-3.5-turbo-1106"));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_unknown_model_needs_budget() {
        let mut config = create_test_config(crate::config::DEFAULT_API_URL);
        config.openai_model = "mystery".to_string();
        config.max_input_tokens = None;
        assert!(OpenAiBackend::from_config(&config).is_err());
    }

    // ==================== Integration Tests with Wiremock ====================

    #[tokio::test]
    async fn test_translate_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-openai-key"))
            .and(body_partial_json(serde_json::json!({
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(create_openai_response(
                r#"{"support":{"ru":"Поддержка"}}"#,
                Some(9),
            )))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = create_backend(&mock_server);
        let response = backend
            .translate("prompt", &support_job())
            .await
            .expect("Should succeed");

        assert_eq!(
            response.translations.get_text("support", "ru"),
            Some(&Text::from("Поддержка"))
        );
        assert_eq!(response.output_tokens, 9);
    }

    #[tokio::test]
    async fn test_translate_without_usage_estimates_output() {
        let mock_server = MockServer::start().await;
        let content = r#"{"support":{"ru":"Поддержка"}}"#;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_openai_response(content, None)),
            )
            .mount(&mock_server)
            .await;

        let response = create_backend(&mock_server)
            .translate("prompt", &support_job())
            .await
            .unwrap();
        assert_eq!(
            response.output_tokens,
            CharEstimator::default().count_tokens(content)
        );
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = create_backend(&mock_server)
            .translate("prompt", &support_job())
            .await
            .unwrap_err();

        match err {
            BackendError::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let err = create_backend(&mock_server)
            .translate("prompt", &support_job())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(create_openai_response(
                r#"{"support":{"ru":"Поддержка"}}"#,
                Some(5),
            )))
            .mount(&mock_server)
            .await;

        let response = create_backend(&mock_server)
            .translate("prompt", &support_job())
            .await
            .expect("Should succeed on second attempt");
        assert_eq!(response.translations.len(), 1);
    }

    #[tokio::test]
    async fn test_non_json_content_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(create_openai_response(
                "Sorry, I cannot help with that.",
                Some(8),
            )))
            .expect(3)
            .mount(&mock_server)
            .await;

        let err = create_backend(&mock_server)
            .translate("prompt", &support_job())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = create_backend(&mock_server)
            .translate("prompt", &support_job())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
