use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{api::openapi, GIT_COMMIT_HASH};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Version {
    pub name: String,
    pub version: String,
    pub commit: String,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service name, version and build commit", body = Version)
    ),
    tag = "custos"
)]
pub async fn root() -> impl IntoResponse {
    Json(Version {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: GIT_COMMIT_HASH.to_string(),
    })
}

// OpenAPI document for the served routes.
pub async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}
