//! Core Router
//!
//! Assembles auth routes with the feature routers under `/api` and applies
//! the auth middleware, CORS and request tracing.

use crate::book_records;
use crate::business;
use crate::chat;
use crate::core::auth::handlers as auth_handlers;
use crate::core::auth::middleware::mw_require_auth;
use crate::core::AppState;
use crate::guides;
use crate::lawyer;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(auth_handlers::me))
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/auth/profile", put(auth_handlers::update_profile))
        .merge(chat::router())
        .merge(business::router())
        .merge(book_records::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            mw_require_auth,
        ));

    let public = Router::new()
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/login", post(auth_handlers::login))
        .route("/health", get(health_check))
        .merge(chat::handlers::socket_router())
        .merge(lawyer::router())
        .merge(guides::router());

    Router::new()
        .route("/", get(root))
        .nest("/api", public.merge(protected))
        .layer(cors_layer(&state.config.client_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(client_url: &str) -> CorsLayer {
    match HeaderValue::from_str(client_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(_) => {
            warn!("CLIENT_URL {:?} is not a valid origin, allowing any", client_url);
            CorsLayer::permissive()
        }
    }
}

async fn root() -> &'static str {
    "MSME Hub server is running"
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "Server is running" }))
}
