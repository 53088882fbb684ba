//! Login and token renewal.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

use super::{bearer_header, error::ErrorBody, renewed_bearer, Message};
use crate::api::AppState;
use crate::auth::{utils::extract_client_ip, AccessGrant, AuthError};

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; the token is in the Authorization header", body = Message),
        (status = 401, description = "Wrong password, retries left", body = ErrorBody),
        (status = 403, description = "Account locked", body = ErrorBody),
        (status = 404, description = "Unknown username", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    if request.username.trim().is_empty() {
        return Err(AuthError::MissingField("'username' is required.".to_string()));
    }

    let source = extract_client_ip(&headers).unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    let token = state
        .login()
        .login(request.username.trim(), &request.password, &source)
        .await
        .inspect_err(|err| warn!(username = request.username.trim(), "login rejected: {err}"))?;

    Ok((
        StatusCode::OK,
        bearer_header(&token)?,
        Json(Message::new("Login successful")),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/auth/renew",
    responses(
        (status = 200, description = "Renewed token in the Authorization header", body = Message),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn renew(
    state: Extension<Arc<AppState>>,
    Extension(_grant): Extension<AccessGrant>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    Ok((
        StatusCode::OK,
        renewed_bearer(state.login(), &headers)?,
        Json(Message::new("Token renewed")),
    )
        .into_response())
}
