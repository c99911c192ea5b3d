//! Orchestration between the pure dialogue/parser core and its collaborators
//! (storage, LLM, debounced writer).

mod chat;
mod tree;

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::db::Database;
use crate::dialogue::{DetectionRules, PromptError, PromptLibrary};
use crate::llm::{LlmProvider, ProviderKind};
use crate::tree::TreeError;
use crate::writer::StateWriter;

pub use chat::ChatService;
pub use tree::TreeService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Everything the HTTP layer needs.
#[derive(Clone)]
pub struct Services {
    pub chat: ChatService,
    pub tree: TreeService,
    pub writer: StateWriter,
}

impl Services {
    pub fn new(
        db: Database,
        llm: Arc<dyn LlmProvider>,
        rules: DetectionRules,
        prompts: PromptLibrary,
        config: &Config,
    ) -> Self {
        let prompts = Arc::new(prompts);
        let writer = StateWriter::new(db.clone(), config.debounce);
        Self {
            chat: ChatService::new(
                db.clone(),
                llm.clone(),
                Arc::new(rules),
                prompts.clone(),
                writer.clone(),
                config,
            ),
            tree: TreeService::new(db, llm, prompts, config.provider),
            writer,
        }
    }

    /// Load rules and build prompts from `config`.
    pub fn from_config(db: Database, llm: Arc<dyn LlmProvider>, config: &Config) -> anyhow::Result<Self> {
        let rules = config.load_rules();
        let prompts = PromptLibrary::new(config.character.clone())?;
        Ok(Self::new(db, llm, rules, prompts, config))
    }
}

fn resolve_provider(requested: Option<&str>, default: ProviderKind) -> Result<ProviderKind, ServiceError> {
    match requested.map(str::trim).filter(|p| !p.is_empty()) {
        Some(name) => ProviderKind::from_str(name)
            .ok_or_else(|| ServiceError::BadRequest(format!("unknown provider: {}", name))),
        None => Ok(default),
    }
}

fn require_user(user_id: &str) -> Result<&str, ServiceError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ServiceError::BadRequest("user_id is required".to_string()));
    }
    Ok(user_id)
}
