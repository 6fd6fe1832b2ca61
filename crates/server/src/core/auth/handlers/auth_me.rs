use crate::core::auth::UserInfo;
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use axum::extract::State;
use axum::Json;

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, ctx: Ctx) -> Result<Json<UserInfo>> {
    // The middleware already resolved the session; only the profile is fetched here.
    let user = state.auth.get_user(ctx.user_id()).await?;

    Ok(Json(user))
}
