//! Public lawyer directory

use crate::core::auth::{Role, UserInfo};
use crate::core::{AppState, Error, Result};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::info;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lawyer", get(list_lawyers))
        .route("/lawyer/{id}", get(get_lawyer))
}

/// GET /api/lawyer
pub async fn list_lawyers(State(state): State<AppState>) -> Result<Json<Vec<UserInfo>>> {
    info!("GET /api/lawyer");
    let lawyers = state.users.list_users(Some(Role::Lawyer)).await?;
    Ok(Json(lawyers))
}

/// GET /api/lawyer/{id}
pub async fn get_lawyer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserInfo>> {
    info!("GET /api/lawyer/{}", id);

    state
        .users
        .find_user(&id)
        .await?
        .filter(|u| u.role == Role::Lawyer)
        .map(Json)
        .ok_or_else(|| Error::NotFound("Lawyer".to_string()))
}
