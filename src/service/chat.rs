use std::sync::Arc;

use uuid::Uuid;

use super::{require_user, resolve_provider, ServiceError};
use crate::config::Config;
use crate::db::Database;
use crate::dialogue::{advance, DetectionRules, PromptLibrary};
use crate::llm::{with_system_prompt, ChatTurn, LlmProvider, ProviderKind};
use crate::models::*;
use crate::parser::has_task_tree_structure;
use crate::writer::StateWriter;

/// Runs goal-hearing turns: state in, LLM call, state and messages out.
#[derive(Clone)]
pub struct ChatService {
    db: Database,
    llm: Arc<dyn LlmProvider>,
    rules: Arc<DetectionRules>,
    prompts: Arc<PromptLibrary>,
    writer: StateWriter,
    provider: ProviderKind,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        db: Database,
        llm: Arc<dyn LlmProvider>,
        rules: Arc<DetectionRules>,
        prompts: Arc<PromptLibrary>,
        writer: StateWriter,
        config: &Config,
    ) -> Self {
        Self {
            db,
            llm,
            rules,
            prompts,
            writer,
            provider: config.provider,
            history_limit: config.history_limit,
        }
    }

    pub fn create_conversation(&self, input: CreateConversationInput) -> Result<Conversation, ServiceError> {
        let user_id = require_user(&input.user_id)?.to_string();
        let conversation = self.db.create_conversation(CreateConversationInput {
            user_id,
            title: input.title,
        })?;
        tracing::info!(id = %conversation.id, user = %conversation.user_id, "conversation created");
        Ok(conversation)
    }

    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ServiceError> {
        Ok(self.db.list_conversations(require_user(user_id)?)?)
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<ConversationDetail, ServiceError> {
        let conversation = self
            .db
            .get_conversation(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("conversation {}", id)))?;
        let state = self.current_state(id)?;
        let messages = self.db.get_messages(id, None)?;
        Ok(ConversationDetail {
            conversation,
            state,
            messages,
        })
    }

    pub fn delete_conversation(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.db.delete_conversation(id)? {
            return Err(ServiceError::NotFound(format!("conversation {}", id)));
        }
        Ok(())
    }

    /// The newest known state: a pending write if there is one, else the stored row.
    pub fn current_state(&self, id: Uuid) -> Result<DialogueState, ServiceError> {
        if let Some(state) = self.writer.latest(id) {
            return Ok(state);
        }
        self.db
            .get_dialogue_state(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("conversation {}", id)))
    }

    /// Run one user turn.
    ///
    /// An LLM failure is returned as an outcome with `error` set; nothing is
    /// stored and the stage is unchanged, so the same message can be resent.
    pub async fn send_message(&self, id: Uuid, input: SendMessageInput) -> Result<TurnOutcome, ServiceError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(ServiceError::BadRequest("message content is empty".to_string()));
        }
        let provider = resolve_provider(input.provider.as_deref(), self.provider)?;

        let state = self.current_state(id)?;
        let last_assistant = self.db.last_assistant_message(id)?;
        let history: Vec<ChatTurn> = self
            .db
            .get_messages(id, Some(self.history_limit))?
            .into_iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content,
            })
            .collect();

        let transition = advance(&state, content, last_assistant.as_deref(), &self.rules);
        let system = self.prompts.render(&transition.prompt)?;
        let turns = with_system_prompt(&system, &history, content);
        let prompt_kind = transition.prompt.kind.as_str().to_string();

        tracing::debug!(
            conversation = %id,
            stage = transition.state.stage.as_str(),
            prompt = %prompt_kind,
            detected = ?transition.detected,
            "dialogue turn"
        );

        let reply = match self.llm.complete(provider, &turns).await.into_result() {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(conversation = %id, %error, "turn failed, state left unchanged");
                return Ok(TurnOutcome {
                    stage: state.stage,
                    progress_percent: state.progress.percent(),
                    prompt_kind,
                    reply: String::new(),
                    error: Some(error),
                    tree_detected: false,
                });
            }
        };

        self.db.append_message(id, Role::User, content)?;
        self.db.append_message(id, Role::Assistant, &reply)?;
        if transition.state != state {
            self.writer.schedule(id, transition.state.clone());
        }

        Ok(TurnOutcome {
            stage: transition.state.stage,
            progress_percent: transition.state.progress.percent(),
            prompt_kind,
            tree_detected: has_task_tree_structure(&reply),
            reply,
            error: None,
        })
    }

    /// Reset the conversation to `normal` with nothing collected. Messages are kept.
    pub fn restart(&self, id: Uuid) -> Result<DialogueState, ServiceError> {
        let state = DialogueState::restart();
        if !self.writer.write_now(id, &state)? {
            return Err(ServiceError::NotFound(format!("conversation {}", id)));
        }
        tracing::info!(conversation = %id, "dialogue restarted");
        Ok(state)
    }
}
