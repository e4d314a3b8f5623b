// Talks to the chat-completion service that turns prompts into code.

use crate::config::CompletionConfig;
use crate::errors::CompletionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SYSTEM_INSTRUCTION: &str = "Return production-ready code only, no markdown or explanations, \
use correct format for the domain (infrastructure-as-code, pipeline config, container manifest, etc.).";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Runs a single completion call and gives up once `timeout` elapses.
pub async fn complete_with_timeout(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String, CompletionError> {
    match actix_web::rt::time::timeout(timeout, client.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(CompletionError::Timeout(timeout)),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            timeout,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(self.timeout)
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout(self.timeout)
            } else {
                CompletionError::Transport(e.to_string())
            }
        })?;

        interpret_response(status, &body)
    }
}

fn interpret_response(status: u16, body: &str) -> Result<String, CompletionError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ApiErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        return Err(CompletionError::Status { status, message });
    }

    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CompletionError::Malformed("response contained no message content".to_string()))
}
