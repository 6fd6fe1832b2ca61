use crate::book_records::{BookRecord, RecordFilter, RecordInput};
use crate::business::Business;
use crate::core::{AppState, Ctx, Error, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

async fn own_business(state: &AppState, ctx: &Ctx) -> Result<Business> {
    state
        .businesses
        .find_by_owner(ctx.user_id())
        .await?
        .ok_or_else(|| Error::NotFound("Business profile".to_string()))
}

/// POST /api/book-records
pub async fn create_record(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<RecordInput>,
) -> Result<(StatusCode, Json<BookRecord>)> {
    info!("POST /api/book-records - {}", ctx.user_id());

    let business = own_business(&state, &ctx).await?;
    let record = state.records.create(&business.id, input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/book-records?type=&startDate=&endDate=
pub async fn list_records(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(filter): Query<RecordFilter>,
) -> Result<Json<Vec<BookRecord>>> {
    info!("GET /api/book-records - {} {:?}", ctx.user_id(), filter);

    let business = own_business(&state, &ctx).await?;
    Ok(Json(state.records.list(&business.id, &filter).await?))
}

/// PUT /api/book-records/{id}
pub async fn update_record(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<String>,
    Json(input): Json<RecordInput>,
) -> Result<Json<BookRecord>> {
    info!("PUT /api/book-records/{} - {}", id, ctx.user_id());

    let business = own_business(&state, &ctx).await?;
    Ok(Json(state.records.update(&business.id, &id, input).await?))
}

/// DELETE /api/book-records/{id}
pub async fn delete_record(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    info!("DELETE /api/book-records/{} - {}", id, ctx.user_id());

    let business = own_business(&state, &ctx).await?;
    state.records.delete(&business.id, &id).await?;
    Ok(Json(json!({ "message": "Record deleted successfully" })))
}
