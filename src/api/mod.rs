use crate::{
    auth::{
        AccessController, AuthConfig, LoginGuard, PgUserRepository, Requirement, RoleSet,
        UserRepository, UserService,
    },
    catalog::{PgProductRepository, ProductRepository, ProductService},
    password::CredentialVault,
    token::TokenCodec,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub(crate) mod guard;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

use handlers::{auth, health, products, root, users};

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn UserRepository>,
    login: LoginGuard,
    users: UserService,
    products: ProductService,
    access: AccessController,
}

impl AppState {
    /// Wire the credential core and the catalog on top of their repositories.
    ///
    /// # Errors
    /// Fails when the secret is not 32 bytes or the cost is out of range.
    pub fn new(
        repo: Arc<dyn UserRepository>,
        catalog: Arc<dyn ProductRepository>,
        secret: SecretString,
        config: &AuthConfig,
    ) -> Result<Self> {
        let tokens = TokenCodec::new(secret)
            .context("Invalid token secret")?
            .with_iv_mode(config.token_iv_mode())
            .with_default_ttl(config.token_ttl_seconds());
        let vault = CredentialVault::with_cost(config.password_cost())
            .context("Invalid password cost")?;

        let users = UserService::new(repo.clone(), vault);
        let login = LoginGuard::new(repo.clone(), tokens.clone(), vault);
        let access = AccessController::new(RoleSet::any_role(), tokens, Arc::new(users.clone()));

        Ok(Self {
            repo,
            login,
            users,
            products: ProductService::new(catalog),
            access,
        })
    }

    #[must_use]
    pub fn repo(&self) -> &Arc<dyn UserRepository> {
        &self.repo
    }

    #[must_use]
    pub fn login(&self) -> &LoginGuard {
        &self.login
    }

    #[must_use]
    pub fn users(&self) -> &UserService {
        &self.users
    }

    #[must_use]
    pub fn products(&self) -> &ProductService {
        &self.products
    }

    /// Access controller bound to `requirements`.
    ///
    /// # Errors
    /// Fails for an empty requirement list.
    pub fn access(
        &self,
        requirements: impl IntoIterator<Item = Requirement>,
    ) -> Result<AccessController> {
        let roles = RoleSet::new(requirements)?;
        Ok(self.access.with_roles(roles))
    }
}

/// Build the router. Each protected route group declares its role set here.
///
/// # Errors
/// Fails only if a role set is empty.
pub fn app(state: AppState, cors: CorsLayer) -> Result<Router> {
    let any_role = state.access([Requirement::Admin, Requirement::User, Requirement::Reader])?;
    let writers = state.access([Requirement::Admin, Requirement::User])?;
    let admin = state.access([Requirement::Admin])?;
    let admin_or_owner = state.access([Requirement::Admin, Requirement::Owner])?;

    let renew = get(auth::renew).route_layer(from_fn_with_state(any_role.clone(), guard::require));
    let list = get(users::list_users).route_layer(from_fn_with_state(admin.clone(), guard::require));
    let user = get(users::get_user)
        .put(users::update_user)
        .route_layer(from_fn_with_state(admin_or_owner, guard::require))
        .merge(
            post(users::create_user)
                .delete(users::delete_user)
                .route_layer(from_fn_with_state(admin.clone(), guard::require)),
        );

    let catalog = get(products::list_products)
        .route_layer(from_fn_with_state(any_role.clone(), guard::require));
    let product = get(products::get_product)
        .route_layer(from_fn_with_state(any_role, guard::require))
        .merge(
            post(products::create_product)
                .put(products::update_product)
                .route_layer(from_fn_with_state(writers, guard::require)),
        )
        .merge(
            delete(products::delete_product)
                .route_layer(from_fn_with_state(admin, guard::require)),
        );

    let app = Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/api-docs/openapi.json", get(root::openapi_json))
        .route("/auth/login", post(auth::login))
        .route("/auth/renew", renew)
        .route("/api/v1/users", list)
        .route("/api/v1/user", user)
        .route("/api/v1/products", catalog)
        .route("/api/v1/product", product)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(Arc::new(state))),
        );

    Ok(app)
}

/// CORS for an optional browser origin; no origin means no cross-origin access.
///
/// # Errors
/// Fails if the origin is not an absolute URL with a host.
pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .expose_headers([AUTHORIZATION]);

    match origin {
        Some(origin) => Ok(cors.allow_origin(AllowOrigin::exact(allowed_origin(origin)?))),
        None => Ok(cors),
    }
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    secret: SecretString,
    config: AuthConfig,
    origin: Option<String>,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let repo = PgUserRepository::new(pool.clone());
    repo.migrate().await.context("Failed to create users schema")?;
    let catalog = PgProductRepository::new(pool);
    catalog
        .migrate()
        .await
        .context("Failed to create products schema")?;

    let state = AppState::new(Arc::new(repo), Arc::new(catalog), secret, &config)?;

    if config.seed_default_accounts() {
        let created = state
            .users()
            .seed_default_accounts()
            .await
            .context("Failed to seed default accounts")?;
        info!("Seeded {} default account(s)", created);
    }

    let app = app(state, cors_layer(origin.as_deref())?)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Gracefully shutdown");
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn allowed_origin(origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(origin).with_context(|| format!("Invalid CORS origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("CORS origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build CORS origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn allowed_origin_drops_path() {
        let origin = allowed_origin("https://console.custos.dev:8443/login?next=/").unwrap();
        assert_eq!(origin, "https://console.custos.dev:8443");
    }

    #[test]
    fn allowed_origin_requires_host() {
        assert!(allowed_origin("mailto:team@custos.dev").is_err());
        assert!(allowed_origin("not a url").is_err());
    }

    #[test]
    fn cors_layer_accepts_no_origin() {
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("http://localhost:3000")).is_ok());
    }
}
