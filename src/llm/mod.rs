//! LLM provider seam.
//!
//! The dialogue core only needs "send these turns, get text back". Providers
//! never see a system role: the system prompt travels as a leading `user`
//! turn built by [`with_system_prompt`].

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Role;

pub use http::{HttpLlmClient, LlmError};

/// Which hosted model family to call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "openai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
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

/// Provider result. Failures are data, not errors, so callers can show them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LlmResponse {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }

    /// The reply text, or the error message on failure.
    pub fn into_result(self) -> Result<String, String> {
        match (self.success, self.content) {
            (true, Some(content)) => Ok(content),
            (_, _) => Err(self
                .error
                .unwrap_or_else(|| "LLM returned no content".to_string())),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, provider: ProviderKind, turns: &[ChatTurn]) -> LlmResponse;
}

/// `[system-as-user, history..., user_message]`
pub fn with_system_prompt(system: &str, history: &[ChatTurn], user_message: &str) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(ChatTurn::user(system));
    turns.extend_from_slice(history);
    turns.push(ChatTurn::user(user_message));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_leads_as_user_turn() {
        let history = vec![ChatTurn::assistant("こんにちは")];
        let turns = with_system_prompt("SYSTEM", &history, "やあ");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0], ChatTurn::user("SYSTEM"));
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[2], ChatTurn::user("やあ"));
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!(ProviderKind::from_str("Gemini"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::from_str("claude"), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::from_str("llama"), None);
    }

    #[test]
    fn failure_without_message_still_explains() {
        let response = LlmResponse {
            success: false,
            content: None,
            error: None,
        };
        assert_eq!(response.into_result().unwrap_err(), "LLM returned no content");
        assert_eq!(LlmResponse::ok("hi").into_result().unwrap(), "hi");
    }
}
