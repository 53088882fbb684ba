//! Authorization stage run in front of protected routes.
//!
//! The route group's [`AccessController`] sees lower-cased headers, the query
//! string and the JSON body. On success the [`AccessGrant`] is added to the
//! request extensions and the buffered body is handed on unchanged.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::{AccessController, AccessGrant, CallContext};

const BODY_LIMIT: usize = 1024 * 1024;

pub async fn require(
    State(access): State<AccessController>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Failed to read request body: {err}");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "Request body too large" })),
            )
                .into_response();
        }
    };

    let call = call_context(&parts, &bytes);
    match access.authorize(&call).await {
        Ok(grant) => {
            debug!(principal_id = %grant.principal_id, basis = ?grant.basis, "access granted");
            parts.extensions.insert::<AccessGrant>(grant);
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Err(err) => err.into_response(),
    }
}

fn call_context(parts: &Parts, body: &Bytes) -> CallContext {
    let mut call = CallContext::new();

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            call = call.with_header(name.as_str(), value);
        }
    }

    if let Some(query) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            call = call.with_query(&key, value.into_owned());
        }
    }

    if !body.is_empty() {
        if let Ok(value) = serde_json::from_slice::<Value>(body) {
            call = call.with_body(value);
        }
    }

    call
}
