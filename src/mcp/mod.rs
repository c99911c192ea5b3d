//! MCP server exposing the task-tree parsers and a user's stored tree.

mod types;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;

use crate::models::{ActionExtraction, MergeTreeInput};
use crate::parser::{has_task_tree_structure, parse_task_tree, render_task_tree};
use crate::service::{ServiceError, TreeService};

#[derive(Clone)]
pub struct McpServer {
    tree: TreeService,
    tool_router: ToolRouter<Self>,
}

fn mcp_error(e: ServiceError) -> McpError {
    match e {
        ServiceError::NotFound(_) | ServiceError::BadRequest(_) | ServiceError::Tree(_) => {
            McpError::invalid_params(e.to_string(), None)
        }
        ServiceError::Prompt(_) | ServiceError::Storage(_) => McpError::internal_error(e.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

impl McpServer {
    pub fn new(tree: TreeService) -> Self {
        Self {
            tree,
            tool_router: Self::tool_router(),
        }
    }

    fn parse(text: &str) -> ParsedTreeResponse {
        let has_structure = has_task_tree_structure(text);
        let nodes = if has_structure {
            parse_task_tree(text)
        } else {
            Vec::new()
        };
        ParsedTreeResponse {
            has_structure,
            node_count: nodes.iter().map(|n| n.subtree_len()).sum(),
            rendered: render_task_tree(&nodes),
            nodes,
        }
    }

    fn outline(&self, user_id: &str, include_archived: bool) -> Result<String, McpError> {
        let nodes = self
            .tree
            .get_forest(user_id, include_archived)
            .map_err(mcp_error)?;
        if nodes.is_empty() {
            return Ok(format!("No tasks yet for {}", user_id.trim()));
        }
        Ok(render_task_tree(&nodes))
    }

    fn merge(&self, req: MergeTaskTreeRequest) -> Result<MergeSummary, McpError> {
        let response = self
            .tree
            .merge_proposal(
                &req.user_id,
                MergeTreeInput {
                    parent_id: req.parent_id,
                    nodes: Vec::new(),
                    text: Some(req.text),
                },
            )
            .map_err(mcp_error)?;
        Ok(MergeSummary {
            nothing_found: response.nothing_found,
            inserted_count: response.inserted.iter().map(|n| n.subtree_len()).sum(),
            rendered: render_task_tree(&response.inserted),
        })
    }

    // ============================================================
    // Test helpers - expose tool logic for testing
    // ============================================================

    pub fn test_parse_task_tree(&self, text: &str) -> ParsedTreeResponse {
        Self::parse(text)
    }

    pub fn test_get_task_tree(&self, user_id: &str) -> Result<String, McpError> {
        self.outline(user_id, false)
    }

    pub fn test_extract_actions(&self, user_id: &str, text: &str) -> Result<ActionExtraction, McpError> {
        self.tree.extract_actions(user_id, text).map_err(mcp_error)
    }

    pub fn test_merge_task_tree(
        &self,
        user_id: &str,
        text: &str,
        parent_id: Option<&str>,
    ) -> Result<MergeSummary, McpError> {
        self.merge(MergeTaskTreeRequest {
            user_id: user_id.to_string(),
            text: text.to_string(),
            parent_id: parent_id.map(str::to_string),
        })
    }
}

#[tool_router]
impl McpServer {
    #[tool(
        description = "Parse LLM output into a task tree without saving it. Understands 'Type: Title' lines (Goal, Project, Milestone, Task) either drawn with tree glyphs (├── └── │) or listed flat. Text with fewer than two type markers is treated as prose and returns no nodes. Returns: has_structure, node_count, nodes (nested), and a normalized glyph rendering."
    )]
    async fn parse_task_tree(
        &self,
        params: Parameters<ParseTaskTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&Self::parse(&params.0.text))
    }

    #[tool(
        description = "Show a user's stored task tree as a glyph outline (Goal ⊃ Project ⊃ Milestone ⊃ Task). Archived nodes are hidden unless include_archived is true."
    )]
    async fn get_task_tree(
        &self,
        params: Parameters<GetTaskTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let outline = self.outline(&req.user_id, req.include_archived)?;
        Ok(CallToolResult::success(vec![Content::text(outline)]))
    }

    #[tool(
        description = "Strip [ADD_GOAL|ADD_PROJECT|ADD_MILESTONE|ADD_TASK|ADD_MEMO:...] tags from assistant text and resolve them against the user's tree. Parent titles match fuzzily; an add aimed at the wrong level is re-typed to fit its parent; unresolvable tags are dropped. Nothing is applied. Returns: display_text and the proposed actions."
    )]
    async fn extract_actions(
        &self,
        params: Parameters<ExtractActionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let extraction = self
            .tree
            .extract_actions(&req.user_id, &req.text)
            .map_err(mcp_error)?;
        json_result(&extraction)
    }

    #[tool(
        description = "Parse task tree text and add it to the user's stored tree, as new roots or under parent_id. When nothing parses the tree is unchanged and nothing_found is true. Side effect: inserts nodes."
    )]
    async fn merge_task_tree(
        &self,
        params: Parameters<MergeTaskTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.merge(params.0)?)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "timeturn".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"TimeTurn stores each user's goals as a task tree and reads the tree-shaped text an LLM writes.

HIERARCHY:
  Goal ⊃ Project ⊃ Milestone ⊃ Task
Tasks are leaves. Nodes are archived, never deleted.

TREE TEXT:
  Goal: 英語上達
  ├── Project: リスニング強化
  │   └── Task: 毎日15分シャドーイング
  └── Project: スピーキング
Flat 'Type: Title' lines without glyphs also work; nesting then follows the type order.

TOOLS:
- parse_task_tree: preview what a piece of text parses into
- get_task_tree: read a user's current tree
- extract_actions: preview the edits a mini-chat reply proposes
- merge_task_tree: save parsed text into a user's tree"#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(tree: TreeService) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(tree);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
