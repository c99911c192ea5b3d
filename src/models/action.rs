use serde::{Deserialize, Serialize};

use super::task_node::NodeType;

/// The kind of mutation an inline action tag proposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AddGoal,
    AddProject,
    AddMilestone,
    AddTask,
    AddMemo,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddGoal => "add_goal",
            Self::AddProject => "add_project",
            Self::AddMilestone => "add_milestone",
            Self::AddTask => "add_task",
            Self::AddMemo => "add_memo",
        }
    }

    /// Parse the tag keyword as it appears in LLM output (`ADD_TASK`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ADD_GOAL" => Some(Self::AddGoal),
            "ADD_PROJECT" => Some(Self::AddProject),
            "ADD_MILESTONE" => Some(Self::AddMilestone),
            "ADD_TASK" => Some(Self::AddTask),
            "ADD_MEMO" => Some(Self::AddMemo),
            _ => None,
        }
    }

    /// The node type this action creates, if it creates one.
    pub fn creates(&self) -> Option<NodeType> {
        match self {
            Self::AddGoal => Some(NodeType::Goal),
            Self::AddProject => Some(NodeType::Project),
            Self::AddMilestone => Some(NodeType::Milestone),
            Self::AddTask => Some(NodeType::Task),
            Self::AddMemo => None,
        }
    }

    /// The add action that creates a node of `node_type`.
    pub fn for_node_type(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Goal => Self::AddGoal,
            NodeType::Project => Self::AddProject,
            NodeType::Milestone => Self::AddMilestone,
            NodeType::Task | NodeType::MicroTask => Self::AddTask,
        }
    }
}

/// A single proposed mutation against a user's task tree.
///
/// Extracted from mini-chat replies with `selected = true`; the user may
/// deselect items before the batch is applied. `success` is filled in by
/// [`crate::tree::TaskTree::apply_actions`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionItem {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default = "default_selected")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

fn default_selected() -> bool {
    true
}

/// LLM text with action tags removed, plus the actions they described.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionExtraction {
    pub display_text: String,
    pub actions: Vec<ActionItem>,
}

/// Input for applying a confirmed batch of actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyActionsInput {
    pub actions: Vec<ActionItem>,
}

/// Result of applying a batch of actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyActionsResponse {
    pub actions: Vec<ActionItem>,
    pub applied: usize,
}
