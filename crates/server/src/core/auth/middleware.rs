use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Pull the bearer token out of an `Authorization` header value.
pub fn bearer_token(value: &str) -> Result<&str> {
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(Error::AuthFailTokenWrongFormat),
    }
}

pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    let auth_header = match req.headers().get(header::AUTHORIZATION) {
        Some(h) => h.to_str().map_err(|_| Error::AuthFailTokenWrongFormat)?,
        None => return Err(Error::AuthFailNoToken),
    };

    let token = bearer_token(auth_header)?.to_string();

    let user = state.auth.validate_session(&token).await?;

    req.extensions_mut()
        .insert(Ctx::new(user.id, user.role, token));

    Ok(next.run(req).await)
}
