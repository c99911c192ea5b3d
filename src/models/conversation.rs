use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dialogue::{DialogueStage, DialogueState};

/// A chat thread between a user and their AI character.
///
/// Each conversation carries its own [`DialogueState`], so starting a new
/// conversation is how a user restarts the goal-hearing flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationInput {
    pub user_id: String,
    /// Defaults to a generic title when omitted.
    #[serde(default)]
    pub title: Option<String>,
}

/// A conversation with its dialogue state and message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub state: DialogueState,
    pub messages: Vec<ChatMessage>,
}

/// Input for sending a user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageInput {
    pub content: String,
    /// Provider to use for this turn. Falls back to the configured default.
    #[serde(default)]
    pub provider: Option<String>,
}

/// The outcome of one user turn in the goal-hearing dialogue.
///
/// When the LLM call fails, `error` carries the provider message verbatim,
/// `reply` is empty, and the stage is the one before the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub stage: DialogueStage,
    pub progress_percent: u8,
    pub prompt_kind: String,
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The reply looks like a task tree and can be parsed on demand.
    pub tree_detected: bool,
}

/// Input for a mini-chat turn about the user's existing tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniChatInput {
    pub message: String,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Reply from the mini-chat with the proposed actions pulled out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniChatOutcome {
    pub display_text: String,
    pub actions: Vec<super::ActionItem>,
    /// No action tag resolved against the tree.
    pub nothing_found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
