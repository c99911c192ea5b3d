//! Request and response types for MCP tools.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::TaskNode;

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ParseTaskTreeRequest {
    #[schemars(
        description = "LLM output containing 'Type: Title' lines (Goal, Project, Milestone, Task), with or without tree glyphs"
    )]
    pub text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTaskTreeRequest {
    #[schemars(description = "The user whose task tree to show")]
    pub user_id: String,
    #[schemars(description = "Include archived nodes (default: false)")]
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractActionsRequest {
    #[schemars(description = "The user whose tree parent names are resolved against")]
    pub user_id: String,
    #[schemars(
        description = "Assistant text containing tags like [ADD_TASK:parent title:task title|memo]"
    )]
    pub text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergeTaskTreeRequest {
    #[schemars(description = "The user whose tree receives the nodes")]
    pub user_id: String,
    #[schemars(description = "Task tree text to parse and insert")]
    pub text: String,
    #[schemars(description = "Optional id of an existing Goal, Project, or Milestone to insert under")]
    #[serde(default)]
    pub parent_id: Option<String>,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ParsedTreeResponse {
    pub has_structure: bool,
    pub node_count: usize,
    pub nodes: Vec<TaskNode>,
    pub rendered: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MergeSummary {
    pub nothing_found: bool,
    pub inserted_count: usize,
    pub rendered: String,
}
