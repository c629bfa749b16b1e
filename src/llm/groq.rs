//! OpenAI-compatible chat completions client (Groq by default)

use super::{CompletionClient, CompletionRequest};
use crate::config::CompletionConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct ChatCompletionsClient {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

/// A failed attempt worth repeating
enum Retryable {
    Status(StatusCode),
    Transport(reqwest::Error),
}

impl std::fmt::Display for Retryable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Retryable::Status(status) => write!(f, "status {status}"),
            Retryable::Transport(e) if e.is_timeout() => write!(f, "timeout: {e}"),
            Retryable::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: max_retries.max(1),
        })
    }

    /// Returns `Ok(None)` when no API key is configured.
    pub fn from_config(config: &CompletionConfig) -> Result<Option<Self>> {
        match &config.api_key {
            Some(key) => Ok(Some(Self::new(
                key.clone(),
                config.base_url.clone(),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )?)),
            None => Ok(None),
        }
    }

    fn body<'a>(request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }

    async fn attempt(
        &self,
        request: &CompletionRequest,
    ) -> Result<std::result::Result<String, Retryable>> {
        let url = format!("{}/chat/completions", self.base_url);
        let sent = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::body(request))
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(e) => return Ok(Err(Retryable::Transport(e))),
        };

        let status = response.status();
        if status.is_success() {
            let parsed: ChatResponse = response.json().await?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| Error::Completion("Response contained no choices".to_string()))?;
            return Ok(Ok(content));
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Ok(Err(Retryable::Status(status)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Completion(format!("Completion API error ({status}): {body}")))
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut last_failure = None;

        for attempt in 1..=self.max_retries {
            match self.attempt(request).await? {
                Ok(content) => return Ok(content),
                Err(failure) => {
                    warn!(
                        "[LLM] {} attempt {}/{} failed: {}",
                        self.provider_name(),
                        attempt,
                        self.max_retries,
                        failure
                    );
                    last_failure = Some(failure);
                    if attempt < self.max_retries {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(Error::Completion(format!(
            "Gave up after {} attempts (last failure: {})",
            self.max_retries,
            last_failure.map(|f| f.to_string()).unwrap_or_default()
        )))
    }

    fn provider_name(&self) -> &str {
        "Groq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_includes_system_message_first() {
        let request = CompletionRequest::new("What is asthma?", "llama-3.1-8b-instant")
            .with_system("You are a careful assistant.")
            .with_max_tokens(150)
            .with_temperature(0.3);

        let body = serde_json::to_value(ChatCompletionsClient::body(&request)).unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What is asthma?");
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_from_config_without_key() {
        let config = CompletionConfig::default();
        assert!(ChatCompletionsClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connection_errors_are_retried() {
        // bind then drop, so nothing listens on the port
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = ChatCompletionsClient::new(
            "test-key".to_string(),
            format!("http://127.0.0.1:{port}"),
            Duration::from_secs(2),
            2,
        )
        .unwrap();

        let outcome = client
            .complete(&CompletionRequest::new("Say OK.", "llama-3.1-8b-instant"))
            .await;

        match outcome {
            Err(Error::Completion(message)) => {
                assert!(message.starts_with("Gave up after 2 attempts"), "{message}");
                assert!(message.contains("transport error"), "{message}");
            }
            other => panic!("expected a completion error, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_groq_completion() {
        let api_key = std::env::var("GROQ_API_KEY").expect("GROQ_API_KEY not set");
        let client = ChatCompletionsClient::new(
            api_key,
            CompletionConfig::default().base_url,
            Duration::from_secs(10),
            2,
        )
        .unwrap();

        let answer = client
            .complete(&CompletionRequest::new("Say OK.", "llama-3.1-8b-instant"))
            .await
            .unwrap();
        assert!(!answer.is_empty());
    }
}
