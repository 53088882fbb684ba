//! Catalog endpoints. Reads admit every role, writes need `user` or `admin`,
//! deletes need `admin`.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::{error::ErrorBody, renewed_bearer, Message};
use crate::api::AppState;
use crate::auth::AuthError;
use crate::catalog::{NewProduct, Product, ProductChanges, ProductLookup, ProductUpdate};

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductTarget {
    pub id: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses(
        (status = 200, description = "The whole catalog", body = [Product]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
pub async fn list_products(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let products = state.products().list_products().await?;
    Ok((StatusCode::OK, renewed_bearer(state.login(), &headers)?, Json(products)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/product",
    params(ProductLookup),
    responses(
        (status = 200, description = "One product", body = Product),
        (status = 400, description = "Neither id nor name given", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Product not found", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
pub async fn get_product(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(lookup): Query<ProductLookup>,
) -> Result<Response, AuthError> {
    let product = state.products().get_product(&lookup).await?;
    Ok((StatusCode::OK, renewed_bearer(state.login(), &headers)?, Json(product)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/product",
    request_body = NewProduct,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Blank name or negative price", body = ErrorBody),
        (status = 403, description = "Readers cannot change the catalog", body = ErrorBody),
        (status = 409, description = "Name already taken", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
pub async fn create_product(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(product): Json<NewProduct>,
) -> Result<Response, AuthError> {
    let created = state.products().create_product(product).await?;
    Ok((
        StatusCode::CREATED,
        renewed_bearer(state.login(), &headers)?,
        Json(created),
    )
        .into_response())
}

#[utoipa::path(
    put,
    path = "/api/v1/product",
    params(ProductTarget),
    request_body = ProductChanges,
    responses(
        (status = 200, description = "Product updated", body = Product),
        (status = 400, description = "No id, blank name or negative price", body = ErrorBody),
        (status = 403, description = "Readers cannot change the catalog", body = ErrorBody),
        (status = 404, description = "Product not found", body = ErrorBody),
        (status = 409, description = "Name already taken", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
pub async fn update_product(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(target): Query<ProductTarget>,
    Json(changes): Json<ProductChanges>,
) -> Result<Response, AuthError> {
    // The body id wins; the query id fills in when the body has none.
    let id = changes
        .id
        .or(target.id)
        .ok_or_else(|| AuthError::MissingField("Missing product id".to_string()))?;

    let updated = state
        .products()
        .update_product(ProductUpdate {
            id,
            name: changes.name,
            price: changes.price,
        })
        .await?;
    Ok((StatusCode::OK, renewed_bearer(state.login(), &headers)?, Json(updated)).into_response())
}

#[utoipa::path(
    delete,
    path = "/api/v1/product",
    params(ProductTarget),
    responses(
        (status = 200, description = "Product deleted", body = Message),
        (status = 400, description = "No id", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 404, description = "Product not found", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
pub async fn delete_product(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(target): Query<ProductTarget>,
) -> Result<Response, AuthError> {
    let id = target
        .id
        .ok_or_else(|| AuthError::MissingField("Missing product id".to_string()))?;
    state.products().delete_product(id).await?;
    Ok((
        StatusCode::OK,
        renewed_bearer(state.login(), &headers)?,
        Json(Message::new("Product deleted")),
    )
        .into_response())
}
