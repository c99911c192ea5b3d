use std::sync::Arc;

use super::{require_user, resolve_provider, ServiceError};
use crate::db::Database;
use crate::dialogue::PromptLibrary;
use crate::llm::{with_system_prompt, LlmProvider, ProviderKind};
use crate::models::*;
use crate::parser::{extract_actions, has_task_tree_structure, parse_task_tree};
use crate::tree::new_node_id;

/// Task tree reads and edits: proposal merges, action batches, the mini-chat.
#[derive(Clone)]
pub struct TreeService {
    db: Database,
    llm: Arc<dyn LlmProvider>,
    prompts: Arc<PromptLibrary>,
    provider: ProviderKind,
}

impl TreeService {
    pub fn new(db: Database, llm: Arc<dyn LlmProvider>, prompts: Arc<PromptLibrary>, provider: ProviderKind) -> Self {
        Self {
            db,
            llm,
            prompts,
            provider,
        }
    }

    pub fn get_forest(&self, user_id: &str, include_archived: bool) -> Result<Vec<TaskNode>, ServiceError> {
        let tree = self.db.get_task_tree(require_user(user_id)?)?;
        Ok(tree.to_forest(include_archived))
    }

    /// Glyph rendering of the user's live tree.
    pub fn outline(&self, user_id: &str) -> Result<String, ServiceError> {
        Ok(self.db.get_task_tree(require_user(user_id)?)?.outline())
    }

    /// Strip action tags from `text` and resolve them against the user's tree.
    pub fn extract_actions(&self, user_id: &str, text: &str) -> Result<ActionExtraction, ServiceError> {
        let tree = self.db.get_task_tree(require_user(user_id)?)?;
        Ok(extract_actions(text, &tree))
    }

    /// Add a proposed forest (given directly or parsed from `text`).
    ///
    /// Text with fewer than two type markers is prose and is not parsed. When
    /// nothing is found the tree is left untouched and `nothing_found` is set.
    pub fn merge_proposal(&self, user_id: &str, input: MergeTreeInput) -> Result<MergeTreeResponse, ServiceError> {
        let user_id = require_user(user_id)?;
        let mut forest = match input.text.as_deref() {
            Some(text) if has_task_tree_structure(text) => parse_task_tree(text),
            Some(_) => Vec::new(),
            None => input.nodes,
        };
        if forest.is_empty() {
            return Ok(MergeTreeResponse {
                nothing_found: true,
                inserted: Vec::new(),
            });
        }
        forest.iter_mut().for_each(fill_missing_ids);

        let mut tree = self.db.get_task_tree(user_id)?;
        let rows = tree.insert_forest(input.parent_id.as_deref(), forest.clone())?;
        self.db.save_nodes(user_id, &rows)?;
        tracing::info!(user = %user_id, nodes = rows.len(), "merged task proposal");

        Ok(MergeTreeResponse {
            nothing_found: false,
            inserted: forest,
        })
    }

    /// Apply the selected actions as one batch and persist what changed.
    pub fn apply_actions(&self, user_id: &str, mut actions: Vec<ActionItem>) -> Result<ApplyActionsResponse, ServiceError> {
        let user_id = require_user(user_id)?;
        let mut tree = self.db.get_task_tree(user_id)?;
        let report = tree.apply_actions(&mut actions);

        self.db.save_nodes(user_id, &report.created)?;
        for (node_id, memo) in &report.memos {
            self.db.update_node_memo(user_id, node_id, memo)?;
        }
        tracing::info!(user = %user_id, applied = report.applied, total = actions.len(), "applied actions");

        Ok(ApplyActionsResponse {
            actions,
            applied: report.applied,
        })
    }

    /// Archive a node and its subtree. Returns the archived ids.
    pub fn archive_node(&self, user_id: &str, node_id: &str) -> Result<Vec<String>, ServiceError> {
        let user_id = require_user(user_id)?;
        let mut tree = self.db.get_task_tree(user_id)?;
        let archived = tree.archive(node_id)?;
        self.db.archive_nodes(user_id, &archived)?;
        Ok(archived)
    }

    /// One mini-chat turn about the user's tree. Proposed edits come back as
    /// actions for the user to confirm; nothing is applied here.
    pub async fn mini_chat(&self, user_id: &str, input: MiniChatInput) -> Result<MiniChatOutcome, ServiceError> {
        let user_id = require_user(user_id)?;
        let message = input.message.trim();
        if message.is_empty() {
            return Err(ServiceError::BadRequest("message is empty".to_string()));
        }
        let provider = resolve_provider(input.provider.as_deref(), self.provider)?;

        let tree = self.db.get_task_tree(user_id)?;
        let system = self.prompts.render_mini_chat(&tree.outline())?;
        let turns = with_system_prompt(&system, &[], message);

        match self.llm.complete(provider, &turns).await.into_result() {
            Ok(reply) => {
                let extraction = extract_actions(&reply, &tree);
                Ok(MiniChatOutcome {
                    nothing_found: extraction.actions.is_empty(),
                    display_text: extraction.display_text,
                    actions: extraction.actions,
                    error: None,
                })
            }
            Err(error) => Ok(MiniChatOutcome {
                display_text: String::new(),
                actions: Vec::new(),
                nothing_found: false,
                error: Some(error),
            }),
        }
    }
}

fn fill_missing_ids(node: &mut TaskNode) {
    if node.id.trim().is_empty() {
        node.id = new_node_id("node");
    }
    node.children.iter_mut().for_each(fill_missing_ids);
}
