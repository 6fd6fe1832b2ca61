//! Auth handlers

use crate::core::auth::{NewUser, ProfileUpdate, Role, UserInfo};
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub profile_image: Option<String>,
    pub token: String,
}

impl AuthResponse {
    fn new(user: UserInfo, token: String) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            profile_image: user.profile_image,
            token,
        }
    }
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    info!("POST /api/auth/register - {}", req.email);

    let role: Role = req.role.parse()?;
    let (user, session) = state
        .auth
        .register(NewUser {
            name: req.name,
            email: req.email,
            password: req.password,
            role,
            phone: req.phone,
        })
        .await
        .inspect_err(|e| warn!("Registration failed: {}", e))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new(user, session.token)),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /api/auth/login - {}", req.email);

    let (user, session) = state.auth.login(&req.email, &req.password).await?;

    info!("User {} logged in successfully", user.email);
    Ok(Json(AuthResponse::new(user, session.token)))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, ctx: Ctx) -> Result<StatusCode> {
    info!("POST /api/auth/logout - {}", ctx.user_id());

    state.auth.logout(ctx.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserInfo>> {
    info!("PUT /api/auth/profile - {}", ctx.user_id());

    let user = state
        .auth
        .update_profile(
            ctx.user_id(),
            ProfileUpdate {
                name: req.name,
                phone: req.phone,
                profile_image: req.profile_image,
            },
        )
        .await?;

    Ok(Json(user))
}
