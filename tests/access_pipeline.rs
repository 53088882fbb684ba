#![allow(clippy::unwrap_used)]

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    response::Response,
    Router,
};
use custos::{
    api::{app, cors_layer, AppState},
    auth::{AuthConfig, InMemoryUserRepository, Role, UserRepository},
    catalog::{InMemoryProductRepository, ProductRepository},
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

async fn seeded_app_with_catalog(
) -> Result<(Router, Arc<InMemoryUserRepository>, Arc<InMemoryProductRepository>)> {
    let repo = Arc::new(InMemoryUserRepository::new());
    let catalog = Arc::new(InMemoryProductRepository::new());
    let config = AuthConfig::new().with_password_cost(4);
    let state = AppState::new(
        repo.clone(),
        catalog.clone(),
        SecretString::from(SECRET.to_string()),
        &config,
    )?;
    state.users().seed_default_accounts().await?;
    Ok((app(state, cors_layer(None)?)?, repo, catalog))
}

async fn seeded_app() -> Result<(Router, Arc<InMemoryUserRepository>)> {
    let (app, repo, _) = seeded_app_with_catalog().await?;
    Ok((app, repo))
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn bearer(response: &Response) -> Option<String> {
    response
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn login(app: &Router, username: &str, password: &str) -> Response {
    app.clone()
        .oneshot(request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        ))
        .await
        .unwrap()
}

async fn token_for(app: &Router, username: &str) -> String {
    let response = login(app, username, "changeme").await;
    assert_eq!(response.status(), StatusCode::OK);
    bearer(&response).unwrap()
}

#[tokio::test]
async fn health_reports_repository() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let response = app
        .oneshot(request(Method::GET, "/health", None, None))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["database"], "ok");
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let response = app
        .oneshot(request(Method::GET, "/api-docs/openapi.json", None, None))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["paths"]["/api/v1/user"].is_object());
    Ok(())
}

#[tokio::test]
async fn admin_lists_users_and_gets_a_renewed_token() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let token = token_for(&app, "admin").await;

    let response = app
        .oneshot(request(Method::GET, "/api/v1/users", Some(&token), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(bearer(&response).is_some());

    let body = json_body(response).await;
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 3);
    assert!(users.iter().all(|user| user.get("password").is_none()));
    assert!(users.iter().all(|user| user.get("salt").is_none()));
    Ok(())
}

#[tokio::test]
async fn missing_or_garbage_token_is_unauthorized() -> Result<()> {
    let (app, _) = seeded_app().await?;

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/v1/users", None, None))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(request(Method::GET, "/api/v1/users", Some("not-a-token"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Invalid token");
    Ok(())
}

#[tokio::test]
async fn reader_cannot_list_users() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let token = token_for(&app, "janedoe").await;

    let response = app
        .oneshot(request(Method::GET, "/api/v1/users", Some(&token), None))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        json_body(response).await["error"],
        "User does not have the required permissions"
    );
    Ok(())
}

#[tokio::test]
async fn owner_reads_own_record_only() -> Result<()> {
    let (app, repo) = seeded_app().await?;
    let john = repo.find_by_username("johndoe").await?.unwrap();
    let admin = repo.find_by_username("admin").await?.unwrap();
    let token = token_for(&app, "johndoe").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/user?id={}", john.id),
            Some(&token),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], "johndoe");

    let response = app
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/user?id={}", admin.id),
            Some(&token),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn owner_updates_through_body_id() -> Result<()> {
    let (app, repo) = seeded_app().await?;
    let john = repo.find_by_username("johndoe").await?.unwrap();
    let token = token_for(&app, "johndoe").await;

    let response = app
        .oneshot(request(
            Method::PUT,
            "/api/v1/user",
            Some(&token),
            Some(json!({ "id": john.id, "fullname": "Johnny Doe" })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["fullname"], "Johnny Doe");

    let stored = repo.find_by_id(john.id).await?.unwrap();
    assert_eq!(stored.fullname, "Johnny Doe");
    Ok(())
}

#[tokio::test]
async fn owner_header_id_does_not_unlock_other_records() -> Result<()> {
    let (app, repo) = seeded_app().await?;
    let john = repo.find_by_username("johndoe").await?.unwrap();
    let admin = repo.find_by_username("admin").await?.unwrap();
    let token = token_for(&app, "johndoe").await;

    for uri in [
        format!("/api/v1/user?id={}", admin.id),
        "/api/v1/user?username=admin".to_string(),
    ] {
        let mut req = request(Method::GET, &uri, Some(&token), None);
        req.headers_mut()
            .insert("id", john.id.to_string().parse().unwrap());
        let response = app.clone().oneshot(req).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        assert!(json_body(response).await.get("username").is_none());
    }
    Ok(())
}

#[tokio::test]
async fn owner_query_id_does_not_unlock_body_target() -> Result<()> {
    let (app, repo) = seeded_app().await?;
    let john = repo.find_by_username("johndoe").await?.unwrap();
    let admin = repo.find_by_username("admin").await?.unwrap();
    let token = token_for(&app, "johndoe").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            &format!("/api/v1/user?id={}", john.id),
            Some(&token),
            Some(json!({ "id": admin.id, "password": "Hacked!pass1" })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let stored = repo.find_by_id(admin.id).await?.unwrap();
    assert_eq!(stored.password_hash, admin.password_hash);
    assert_eq!(login(&app, "admin", "Hacked!pass1").await.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn owner_cannot_change_own_role() -> Result<()> {
    let (app, repo) = seeded_app().await?;
    let jane = repo.find_by_username("janedoe").await?.unwrap();
    let token = token_for(&app, "janedoe").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/api/v1/user",
            Some(&token),
            Some(json!({ "id": jane.id, "role": "admin" })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(repo.find_by_id(jane.id).await?.unwrap().role, Role::Reader);

    let admin_token = token_for(&app, "admin").await;
    let response = app
        .oneshot(request(
            Method::PUT,
            "/api/v1/user",
            Some(&admin_token),
            Some(json!({ "id": jane.id, "role": "user" })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(repo.find_by_id(jane.id).await?.unwrap().role, Role::User);
    Ok(())
}

#[tokio::test]
async fn admin_creates_and_deletes_users() -> Result<()> {
    let (app, repo) = seeded_app().await?;
    let token = token_for(&app, "admin").await;
    let alice = json!({
        "username": "alice",
        "email": "alice@example.com",
        "fullname": "Alice Liddell",
        "password": "Wonder!and1",
        "role": "user"
    });

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/api/v1/user", Some(&token), Some(alice.clone())))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["status"], "active");
    assert_eq!(created["retries"], 3);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/api/v1/user", Some(&token), Some(alice)))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let weak = json!({
        "username": "bob",
        "email": "bob@example.com",
        "fullname": "Bob",
        "password": "password",
        "role": "reader"
    });
    let response = app
        .clone()
        .oneshot(request(Method::POST, "/api/v1/user", Some(&token), Some(weak)))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let id = created["id"].as_i64().unwrap();
    let response = app
        .oneshot(request(
            Method::DELETE,
            &format!("/api/v1/user?id={id}"),
            Some(&token),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(repo.find_by_id(id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn user_cannot_create_users() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let token = token_for(&app, "johndoe").await;

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/user",
            Some(&token),
            Some(json!({
                "username": "mallory",
                "email": "mallory@example.com",
                "fullname": "Mallory",
                "password": "Str0ng!pass",
                "role": "admin"
            })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn three_failures_lock_the_account() -> Result<()> {
    let (app, _) = seeded_app().await?;

    let first = login(&app, "johndoe", "wrong").await;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(first).await["error"],
        "Authentication failed. Retries left: 2."
    );

    let second = login(&app, "johndoe", "wrong").await;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);

    let third = login(&app, "johndoe", "wrong").await;
    assert_eq!(third.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(third).await["error"], "Too many failed login attempts.");

    let correct = login(&app, "johndoe", "changeme").await;
    assert_eq!(correct.status(), StatusCode::FORBIDDEN);
    assert!(bearer(&correct).is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_user_is_not_found() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let response = login(&app, "nobody", "changeme").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn renew_issues_a_new_token() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let token = token_for(&app, "janedoe").await;

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/auth/renew", Some(&token), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let renewed = bearer(&response).unwrap();
    assert_ne!(renewed, token);

    let response = app
        .oneshot(request(Method::GET, "/auth/renew", Some(&renewed), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn owner_routes_need_a_target_id() -> Result<()> {
    let (app, _) = seeded_app().await?;
    let token = token_for(&app, "admin").await;

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/v1/user?username=johndoe",
            Some(&token),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Record ownership could not be verified"
    );
    Ok(())
}

#[tokio::test]
async fn catalog_roles() -> Result<()> {
    let (app, _, catalog) = seeded_app_with_catalog().await?;
    let admin = token_for(&app, "admin").await;
    let user = token_for(&app, "johndoe").await;
    let reader = token_for(&app, "janedoe").await;
    let lamp = json!({ "name": "Lamp", "price": 1999 });

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/api/v1/product", Some(&reader), Some(lamp.clone())))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(catalog.count().await?, 0);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/api/v1/product", Some(&user), Some(lamp)))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(bearer(&response).is_some());
    let id = json_body(response).await["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/v1/products", Some(&reader), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().map(Vec::len), Some(1));

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/v1/product?prodname=Lamp", Some(&reader), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], id);

    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            &format!("/api/v1/product?id={id}"),
            Some(&user),
            Some(json!({ "price": 2499 })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["price"], 2499);

    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/api/v1/product",
            Some(&reader),
            Some(json!({ "id": id, "price": 1 })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(catalog.find_by_id(id).await?.unwrap().price, 2499);

    let uri = format!("/api/v1/product?id={id}");
    let response = app
        .clone()
        .oneshot(request(Method::DELETE, &uri, Some(&user), None))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, &uri, Some(&admin), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(catalog.find_by_id(id).await?.is_none());

    let response = app
        .oneshot(request(Method::GET, &uri, Some(&reader), None))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Product not found");
    Ok(())
}
