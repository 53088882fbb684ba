use super::handlers::{auth, error::ErrorBody, health, products, root, users, Message};
use crate::auth::{NewUser, PrincipalStatus, PrincipalView, Role, UserChanges};
use crate::catalog::{NewProduct, Product, ProductChanges};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, Info, InfoBuilder, License, Tag,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        root::root,
        health::health,
        auth::login,
        auth::renew,
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
    ),
    components(schemas(
        ErrorBody,
        Message,
        NewProduct,
        NewUser,
        Product,
        ProductChanges,
        PrincipalStatus,
        PrincipalView,
        Role,
        UserChanges
    )),
    modifiers(&BearerToken)
)]
struct ApiDoc;

struct BearerToken;

impl Modify for BearerToken {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// The document served at `/api-docs/openapi.json`.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut openapi = ApiDoc::openapi();
    openapi.info = cargo_info();

    let mut custos_tag = Tag::new("custos");
    custos_tag.description = Some("Credential and access-control core".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login and token renewal".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("User management".to_string());

    let mut products_tag = Tag::new("products");
    products_tag.description = Some("Product catalog".to_string());

    openapi.tags = Some(vec![custos_tag, auth_tag, users_tag, products_tag]);
    openapi
}

fn cargo_info() -> Info {
    // Cargo.toml metadata instead of the derive defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `:` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(':').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = non_empty(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_comes_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact.unwrap_or_default();
        assert_eq!(contact.name.as_deref(), Some("Team Custos"));
        assert_eq!(contact.email.as_deref(), Some("team@custos.dev"));

        let license = doc.info.license.map(|license| license.name);
        assert_eq!(license.as_deref(), Some("BSD-3-Clause"));
    }

    #[test]
    fn documents_every_route() {
        let doc = openapi();
        for path in [
            "/",
            "/health",
            "/auth/login",
            "/auth/renew",
            "/api/v1/users",
            "/api/v1/user",
            "/api/v1/products",
            "/api/v1/product",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
        let schemes = doc
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
    }

    #[test]
    fn author_parsing() {
        assert_eq!(parse_author("Ann <ann@x.dev>"), (Some("Ann"), Some("ann@x.dev")));
        assert_eq!(parse_author("<ann@x.dev>"), (None, Some("ann@x.dev")));
        assert_eq!(parse_author("Ann"), (Some("Ann"), None));
        assert_eq!(parse_author("  "), (None, None));
    }
}
