//! Route handlers and the helpers they share.
//!
//! Protected handlers run behind [`crate::api::guard::require`], so by the time
//! they execute the bearer token has been checked and an [`AccessGrant`] is in
//! the request extensions.
//!
//! [`AccessGrant`]: crate::auth::AccessGrant

pub mod auth;
pub mod error;
pub mod health;
pub mod products;
pub mod root;
pub mod users;

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{utils::strip_bearer, AuthError, LoginGuard};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// `Authorization: Bearer <token>` as a response header map.
pub(crate) fn bearer_header(token: &str) -> Result<HeaderMap, AuthError> {
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|err| AuthError::Internal(format!("bearer header: {err}")))?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Re-issue the caller's token and return it as a response header.
pub(crate) fn renewed_bearer(login: &LoginGuard, headers: &HeaderMap) -> Result<HeaderMap, AuthError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(strip_bearer)
        .ok_or_else(|| AuthError::Authentication("Authentication required".to_string()))?;
    bearer_header(&login.refresh_token(token)?)
}
