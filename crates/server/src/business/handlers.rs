use crate::business::{Business, BusinessInput};
use crate::core::auth::Role;
use crate::core::{AppState, Ctx, Error, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

/// POST /api/business
pub async fn create_business(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<BusinessInput>,
) -> Result<(StatusCode, Json<Business>)> {
    info!("POST /api/business - {}", ctx.user_id());

    if ctx.role() != Role::Business {
        return Err(Error::Forbidden(
            "Only business owners can create a business profile".to_string(),
        ));
    }

    let business = state.businesses.create(ctx.user_id(), input).await?;
    Ok((StatusCode::CREATED, Json(business)))
}

/// GET /api/business/my-business
///
/// `null` when the caller has no profile yet.
pub async fn my_business(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Option<Business>>> {
    info!("GET /api/business/my-business - {}", ctx.user_id());
    Ok(Json(state.businesses.find_by_owner(ctx.user_id()).await?))
}

/// PUT /api/business/{id}
pub async fn update_business(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<String>,
    Json(input): Json<BusinessInput>,
) -> Result<Json<Business>> {
    info!("PUT /api/business/{} - {}", id, ctx.user_id());

    let business = state.businesses.update(&id, ctx.user_id(), input).await?;
    Ok(Json(business))
}
