//! User management endpoints.
//!
//! Flow Overview:
//! 1) The access guard checks the bearer token and the route group's roles
//!    (`admin`, or `admin, owner` for reading and updating one record).
//! 2) The handler calls the [`UserService`](crate::auth::UserService). Calls
//!    admitted by the owner rule are confined to the id the rule matched.
//! 3) Successful responses carry a renewed bearer token.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use super::{error::ErrorBody, renewed_bearer, Message};
use crate::api::AppState;
use crate::auth::{AccessGrant, AuthError, NewUser, PrincipalView, UserChanges, UserLookup};

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteQuery {
    pub id: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "All users", body = [PrincipalView]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let users = state.users().list_users().await?;
    Ok((StatusCode::OK, renewed_bearer(state.login(), &headers)?, Json(users)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/user",
    params(UserLookup),
    responses(
        (status = 200, description = "One user", body = PrincipalView),
        (status = 400, description = "Neither id nor username given", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Caller is neither an admin nor the owner", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    state: Extension<Arc<AppState>>,
    Extension(grant): Extension<AccessGrant>,
    headers: HeaderMap,
    Query(lookup): Query<UserLookup>,
) -> Result<Response, AuthError> {
    debug!(principal_id = %grant.principal_id, basis = ?grant.basis, "get user");
    let user = state.users().get_user(&lookup, grant.owned_id()?).await?;
    Ok((StatusCode::OK, renewed_bearer(state.login(), &headers)?, Json(user)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/user",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = PrincipalView),
        (status = 400, description = "Missing field or weak password", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 409, description = "Username or email already taken", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(user): Json<NewUser>,
) -> Result<Response, AuthError> {
    let created = state.users().create_user(user).await?;
    Ok((
        StatusCode::CREATED,
        renewed_bearer(state.login(), &headers)?,
        Json(created),
    )
        .into_response())
}

#[utoipa::path(
    put,
    path = "/api/v1/user",
    request_body = UserChanges,
    responses(
        (status = 200, description = "User updated", body = PrincipalView),
        (status = 400, description = "Weak password", body = ErrorBody),
        (status = 403, description = "Caller is neither an admin nor the owner, or an owner sent a role", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 409, description = "Username or email already taken", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    state: Extension<Arc<AppState>>,
    Extension(grant): Extension<AccessGrant>,
    headers: HeaderMap,
    Json(changes): Json<UserChanges>,
) -> Result<Response, AuthError> {
    debug!(principal_id = %grant.principal_id, basis = ?grant.basis, "update user");
    let updated = state.users().update_user(changes, grant.owned_id()?).await?;
    Ok((StatusCode::OK, renewed_bearer(state.login(), &headers)?, Json(updated)).into_response())
}

#[utoipa::path(
    delete,
    path = "/api/v1/user",
    params(DeleteQuery),
    responses(
        (status = 200, description = "User deleted", body = Message),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DeleteQuery>,
) -> Result<Response, AuthError> {
    state.users().delete_user(query.id).await?;
    Ok((
        StatusCode::OK,
        renewed_bearer(state.login(), &headers)?,
        Json(Message::new("User deleted")),
    )
        .into_response())
}
