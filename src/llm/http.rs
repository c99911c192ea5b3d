//! HTTP client for hosted LLM APIs.
//!
//! Configuration is via environment variables:
//! - `GEMINI_API_KEY`, `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` - provider keys
//! - `GEMINI_MODEL`, `OPENAI_MODEL`, `ANTHROPIC_MODEL` - model overrides

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use super::{ChatTurn, LlmProvider, LlmResponse, ProviderKind};
use crate::models::Role;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
const ANTHROPIC_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} is not set")]
    MissingKey(&'static str),

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response had no text content")]
    EmptyResponse,
}

#[derive(Debug, Clone, Default)]
struct ProviderKeys {
    gemini: Option<String>,
    openai: Option<String>,
    anthropic: Option<String>,
}

#[derive(Debug, Clone)]
struct Models {
    gemini: String,
    openai: String,
    anthropic: String,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            gemini: DEFAULT_GEMINI_MODEL.to_string(),
            openai: DEFAULT_OPENAI_MODEL.to_string(),
            anthropic: DEFAULT_ANTHROPIC_MODEL.to_string(),
        }
    }
}

/// Calls Gemini, OpenAI, or Anthropic over HTTPS. One attempt per call.
#[derive(Debug, Clone)]
pub struct HttpLlmClient {
    client: Client,
    keys: ProviderKeys,
    models: Models,
}

impl HttpLlmClient {
    pub fn from_env() -> Result<Self, LlmError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let defaults = Models::default();
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            keys: ProviderKeys {
                gemini: var("GEMINI_API_KEY"),
                openai: var("OPENAI_API_KEY"),
                anthropic: var("ANTHROPIC_API_KEY"),
            },
            models: Models {
                gemini: var("GEMINI_MODEL").unwrap_or(defaults.gemini),
                openai: var("OPENAI_MODEL").unwrap_or(defaults.openai),
                anthropic: var("ANTHROPIC_MODEL").unwrap_or(defaults.anthropic),
            },
        })
    }

    async fn send(&self, provider: ProviderKind, turns: &[ChatTurn]) -> Result<String, LlmError> {
        let request = match provider {
            ProviderKind::Gemini => {
                let key = self.keys.gemini.as_deref().ok_or(LlmError::MissingKey("GEMINI_API_KEY"))?;
                let url = format!("{}/{}:generateContent", GEMINI_URL, self.models.gemini);
                self.client
                    .post(url)
                    .query(&[("key", key)])
                    .json(&gemini_body(turns))
            }
            ProviderKind::OpenAi => {
                let key = self.keys.openai.as_deref().ok_or(LlmError::MissingKey("OPENAI_API_KEY"))?;
                self.client
                    .post(OPENAI_URL)
                    .bearer_auth(key)
                    .json(&openai_body(&self.models.openai, turns))
            }
            ProviderKind::Anthropic => {
                let key = self
                    .keys
                    .anthropic
                    .as_deref()
                    .ok_or(LlmError::MissingKey("ANTHROPIC_API_KEY"))?;
                self.client
                    .post(ANTHROPIC_URL)
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&anthropic_body(&self.models.anthropic, turns))
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        extract_text(provider, &value).ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmProvider for HttpLlmClient {
    async fn complete(&self, provider: ProviderKind, turns: &[ChatTurn]) -> LlmResponse {
        match self.send(provider, turns).await {
            Ok(content) => LlmResponse::ok(content),
            Err(e) => {
                tracing::warn!(provider = provider.as_str(), error = %e, "LLM call failed");
                LlmResponse::failure(e.to_string())
            }
        }
    }
}

fn gemini_body(turns: &[ChatTurn]) -> Value {
    let contents: Vec<Value> = turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();
    json!({ "contents": contents })
}

fn chat_messages(turns: &[ChatTurn]) -> Vec<Value> {
    turns
        .iter()
        .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.content }))
        .collect()
}

fn openai_body(model: &str, turns: &[ChatTurn]) -> Value {
    json!({ "model": model, "messages": chat_messages(turns) })
}

fn anthropic_body(model: &str, turns: &[ChatTurn]) -> Value {
    json!({
        "model": model,
        "max_tokens": ANTHROPIC_MAX_TOKENS,
        "messages": chat_messages(turns),
    })
}

fn extract_text(provider: ProviderKind, value: &Value) -> Option<String> {
    let pointer = match provider {
        ProviderKind::Gemini => "/candidates/0/content/parts/0/text",
        ProviderKind::OpenAi => "/choices/0/message/content",
        ProviderKind::Anthropic => "/content/0/text",
    };
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}
