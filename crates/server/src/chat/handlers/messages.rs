//! Direct message endpoints

use crate::chat::models::{CardCache, ChatSummaryView, MessageView, SendMessageInput};
use crate::chat::validate_send;
use crate::core::auth::{Role, UserInfo};
use crate::core::{AppState, Ctx, Error, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};

/// POST /api/chat/messages
pub async fn send_message(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<SendMessageInput>,
) -> Result<(StatusCode, Json<MessageView>)> {
    info!("POST /api/chat/messages - {} -> {}", ctx.user_id(), input.receiver_id);

    validate_send(ctx.user_id(), &input.receiver_id, &input.content)?;
    if state.users.find_user(&input.receiver_id).await?.is_none() {
        return Err(Error::NotFound("Receiver".to_string()));
    }

    let message = state
        .store
        .append(ctx.user_id(), &input.receiver_id, &input.content)
        .await?;

    let view = CardCache::new(state.users.clone()).expand(message).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/chat/messages/{user_id}
///
/// Marks every message addressed to the caller in this conversation as read.
pub async fn list_messages(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<MessageView>>> {
    info!("GET /api/chat/messages/{} - {}", user_id, ctx.user_id());

    let messages = state.store.list_conversation(ctx.user_id(), &user_id).await?;
    let views = CardCache::new(state.users.clone())
        .expand_all(messages)
        .await?;

    Ok(Json(views))
}

/// GET /api/chat/list
pub async fn list_chats(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<ChatSummaryView>>> {
    info!("GET /api/chat/list - {}", ctx.user_id());

    let chats = state.store.list_chats(ctx.user_id()).await;

    let mut cards = CardCache::new(state.users.clone());
    let mut views = Vec::with_capacity(chats.len());
    for chat in chats {
        views.push(cards.expand_summary(chat).await?);
    }

    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<String>,
}

/// GET /api/chat/users?role=
pub async fn list_users(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<UserInfo>>> {
    info!("GET /api/chat/users - role={:?}", query.role);

    // A role nobody can have matches nobody.
    let role = match query.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                debug!("Unknown role filter {:?}", raw);
                return Ok(Json(Vec::new()));
            }
        },
    };

    let users = state
        .users
        .list_users(role)
        .await?
        .into_iter()
        .filter(|u| u.id != ctx.user_id())
        .collect();

    Ok(Json(users))
}
