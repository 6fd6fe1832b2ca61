//! Chat Handlers and Router
//!
//! REST endpoints for sending and reading direct messages, plus the
//! WebSocket live channel.

use crate::core::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub mod messages;
pub mod socket;

/// Routes that need an authenticated caller
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/messages", post(messages::send_message))
        .route("/chat/messages/{user_id}", get(messages::list_messages))
        .route("/chat/list", get(messages::list_chats))
        .route("/chat/users", get(messages::list_users))
}

/// The live channel authenticates on upgrade, not through the middleware
pub fn socket_router() -> Router<AppState> {
    Router::new().route("/chat/socket", get(socket::chat_socket))
}
