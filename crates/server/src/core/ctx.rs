use crate::core::auth::Role;
use crate::core::error::{Error, Result};
use axum::{extract::FromRequestParts, http::request::Parts};

/// Identity of the caller, resolved by the auth middleware.
#[derive(Clone, Debug)]
pub struct Ctx {
    user_id: String,
    role: Role,
    token: String,
}

impl Ctx {
    pub fn new(user_id: String, role: Role, token: String) -> Self {
        Self {
            user_id,
            role,
            token,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::AuthFailCtxNotInRequestExt)
    }
}
