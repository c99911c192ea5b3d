mod handlers;
pub mod middleware;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::service::Services;
use middleware::{auth_middleware, rate_limit_middleware, SecurityConfig};

pub use handlers::{ParseTreeInput, ParseTreeResponse, TaskTreeResponse, TextInput};

/// Router with security disabled (local use and tests).
pub fn create_router(services: Services) -> Router {
    create_router_with_security(services, SecurityConfig::disabled())
}

pub fn create_router_with_security(services: Services, security: SecurityConfig) -> Router {
    let api = Router::new()
        // Conversations
        .route("/conversations", post(handlers::create_conversation))
        .route(
            "/conversations/{id}",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .route("/conversations/{id}/messages", post(handlers::send_message))
        .route("/conversations/{id}/restart", post(handlers::restart_conversation))
        .route("/users/{user_id}/conversations", get(handlers::list_conversations))
        // Parsing
        .route("/parse/tree", post(handlers::parse_tree))
        // Task tree
        .route(
            "/users/{user_id}/tree",
            get(handlers::get_task_tree).post(handlers::merge_task_tree),
        )
        .route("/users/{user_id}/tree/parse-actions", post(handlers::parse_actions))
        .route("/users/{user_id}/tree/actions", post(handlers::apply_actions))
        .route("/users/{user_id}/mini-chat", post(handlers::mini_chat))
        .route("/users/{user_id}/nodes/{node_id}/archive", post(handlers::archive_node))
        // Health
        .route("/health", get(handlers::health));

    let mut router = Router::new().nest("/api/v1", api).with_state(services);
    if let Some(limiter) = security.rate_limiter.clone() {
        router = router.layer(from_fn_with_state(limiter, rate_limit_middleware));
    }
    // Applied innermost-first: auth, then trace, then CORS outermost.
    let cors = security.cors_layer();
    router
        .layer(from_fn_with_state(security, auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
