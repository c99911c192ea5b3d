use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::*;
use crate::parser::{has_task_tree_structure, parse_task_tree, render_task_tree};
use crate::service::{ServiceError, Services};
use crate::tree::TreeError;

// ============================================================
// Error Handling
// ============================================================

/// Map a service error to a response. Client errors keep their message;
/// internal failures are logged in full and returned as a generic message.
fn service_error(e: ServiceError) -> (StatusCode, String) {
    let status = match &e {
        ServiceError::NotFound(_) | ServiceError::Tree(TreeError::NotFound(_)) => StatusCode::NOT_FOUND,
        ServiceError::BadRequest(_) | ServiceError::Tree(_) => StatusCode::BAD_REQUEST,
        ServiceError::Prompt(_) | ServiceError::Storage(_) => {
            tracing::error!("Internal error: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    tracing::warn!("Request rejected: {}", e);
    (status, e.to_string())
}

// ============================================================
// Request / response types
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextInput {
    pub text: String,
}

pub type ParseTreeInput = TextInput;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseTreeResponse {
    /// At least two type markers were found.
    pub has_structure: bool,
    /// Empty unless `has_structure` is set.
    pub nodes: Vec<TaskNode>,
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTreeResponse {
    pub nodes: Vec<TaskNode>,
    pub outline: String,
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    #[serde(default)]
    pub include_archived: bool,
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Conversations
// ============================================================

pub async fn create_conversation(
    State(services): State<Services>,
    Json(input): Json<CreateConversationInput>,
) -> Result<(StatusCode, Json<Conversation>), (StatusCode, String)> {
    services
        .chat
        .create_conversation(input)
        .map(|c| (StatusCode::CREATED, Json(c)))
        .map_err(service_error)
}

pub async fn get_conversation(
    State(services): State<Services>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, (StatusCode, String)> {
    services.chat.get_conversation(id).map(Json).map_err(service_error)
}

pub async fn delete_conversation(
    State(services): State<Services>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    services
        .chat
        .delete_conversation(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(service_error)
}

pub async fn list_conversations(
    State(services): State<Services>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Conversation>>, (StatusCode, String)> {
    services
        .chat
        .list_conversations(&user_id)
        .map(Json)
        .map_err(service_error)
}

pub async fn send_message(
    State(services): State<Services>,
    Path(id): Path<Uuid>,
    Json(input): Json<SendMessageInput>,
) -> Result<Json<TurnOutcome>, (StatusCode, String)> {
    services
        .chat
        .send_message(id, input)
        .await
        .map(Json)
        .map_err(service_error)
}

pub async fn restart_conversation(
    State(services): State<Services>,
    Path(id): Path<Uuid>,
) -> Result<Json<DialogueState>, (StatusCode, String)> {
    services.chat.restart(id).map(Json).map_err(service_error)
}

// ============================================================
// Parsing
// ============================================================

pub async fn parse_tree(Json(input): Json<ParseTreeInput>) -> Json<ParseTreeResponse> {
    let has_structure = has_task_tree_structure(&input.text);
    let nodes = if has_structure {
        parse_task_tree(&input.text)
    } else {
        Vec::new()
    };
    let rendered = render_task_tree(&nodes);
    Json(ParseTreeResponse {
        has_structure,
        nodes,
        rendered,
    })
}

pub async fn parse_actions(
    State(services): State<Services>,
    Path(user_id): Path<String>,
    Json(input): Json<TextInput>,
) -> Result<Json<ActionExtraction>, (StatusCode, String)> {
    services
        .tree
        .extract_actions(&user_id, &input.text)
        .map(Json)
        .map_err(service_error)
}

// ============================================================
// Task tree
// ============================================================

pub async fn get_task_tree(
    State(services): State<Services>,
    Path(user_id): Path<String>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<TaskTreeResponse>, (StatusCode, String)> {
    let nodes = services
        .tree
        .get_forest(&user_id, query.include_archived)
        .map_err(service_error)?;
    let outline = render_task_tree(&nodes);
    Ok(Json(TaskTreeResponse { nodes, outline }))
}

pub async fn merge_task_tree(
    State(services): State<Services>,
    Path(user_id): Path<String>,
    Json(input): Json<MergeTreeInput>,
) -> Result<(StatusCode, Json<MergeTreeResponse>), (StatusCode, String)> {
    let response = services
        .tree
        .merge_proposal(&user_id, input)
        .map_err(service_error)?;
    let status = if response.nothing_found {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

pub async fn apply_actions(
    State(services): State<Services>,
    Path(user_id): Path<String>,
    Json(input): Json<ApplyActionsInput>,
) -> Result<Json<ApplyActionsResponse>, (StatusCode, String)> {
    services
        .tree
        .apply_actions(&user_id, input.actions)
        .map(Json)
        .map_err(service_error)
}

pub async fn mini_chat(
    State(services): State<Services>,
    Path(user_id): Path<String>,
    Json(input): Json<MiniChatInput>,
) -> Result<Json<MiniChatOutcome>, (StatusCode, String)> {
    services
        .tree
        .mini_chat(&user_id, input)
        .await
        .map(Json)
        .map_err(service_error)
}

pub async fn archive_node(
    State(services): State<Services>,
    Path((user_id, node_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let archived = services
        .tree
        .archive_node(&user_id, &node_id)
        .map_err(service_error)?;
    Ok(Json(serde_json::json!({ "archived": archived })))
}
