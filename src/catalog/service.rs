use std::sync::Arc;
use tracing::info;

use super::product::{NewProduct, Product, ProductLookup, ProductUpdate};
use super::repo::ProductRepository;
use crate::auth::{AuthError, RepositoryError};

pub const PRODUCT_NOT_FOUND: &str = "Product not found";

fn catalog_error(err: RepositoryError) -> AuthError {
    match err {
        RepositoryError::NotFound => AuthError::NotFound(PRODUCT_NOT_FOUND.to_string()),
        other => other.into(),
    }
}

fn check_name(name: &str) -> Result<(), AuthError> {
    if name.trim().is_empty() {
        return Err(AuthError::MissingField("'name' is required.".to_string()));
    }
    Ok(())
}

fn check_price(price: i64) -> Result<(), AuthError> {
    if price < 0 {
        return Err(AuthError::InvalidProperty(
            "'price' must not be negative.".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ProductService {
    repo: Arc<dyn ProductRepository>,
}

impl ProductService {
    #[must_use]
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    /// # Errors
    /// `MissingField` for an empty lookup, `NotFound` if nothing matches.
    pub async fn get_product(&self, lookup: &ProductLookup) -> Result<Product, AuthError> {
        let found = if let Some(id) = lookup.id {
            self.repo.find_by_id(id).await
        } else if let Some(name) = lookup.name.as_deref().filter(|n| !n.trim().is_empty()) {
            self.repo.find_by_name(name.trim()).await
        } else {
            return Err(AuthError::MissingField(
                "Missing product name or id".to_string(),
            ));
        };

        found
            .map_err(catalog_error)?
            .ok_or_else(|| AuthError::NotFound(PRODUCT_NOT_FOUND.to_string()))
    }

    /// # Errors
    /// Repository failures.
    pub async fn list_products(&self) -> Result<Vec<Product>, AuthError> {
        self.repo.find_all().await.map_err(catalog_error)
    }

    /// # Errors
    /// `MissingField` for a blank name, `InvalidProperty` for a negative
    /// price, `Conflict` for a taken name.
    pub async fn create_product(&self, product: NewProduct) -> Result<Product, AuthError> {
        check_name(&product.name)?;
        check_price(product.price)?;

        let created = self
            .repo
            .create(NewProduct {
                name: product.name.trim().to_string(),
                price: product.price,
            })
            .await
            .map_err(catalog_error)?;
        info!(product_id = created.id, "product created");
        Ok(created)
    }

    /// # Errors
    /// As [`Self::create_product`] for the supplied fields, plus `NotFound`.
    pub async fn update_product(&self, mut update: ProductUpdate) -> Result<Product, AuthError> {
        if let Some(name) = update.name.as_deref() {
            check_name(name)?;
        }
        if let Some(price) = update.price {
            check_price(price)?;
        }
        update.name = update.name.map(|name| name.trim().to_string());

        let updated = self.repo.update(update).await.map_err(catalog_error)?;
        info!(product_id = updated.id, "product updated");
        Ok(updated)
    }

    /// # Errors
    /// `NotFound` if the id does not exist.
    pub async fn delete_product(&self, id: i64) -> Result<(), AuthError> {
        if !self.repo.delete_by_id(id).await.map_err(catalog_error)? {
            return Err(AuthError::NotFound(PRODUCT_NOT_FOUND.to_string()));
        }
        info!(product_id = id, "product deleted");
        Ok(())
    }

    /// # Errors
    /// Repository failures.
    pub async fn count(&self) -> Result<i64, AuthError> {
        self.repo.count().await.map_err(catalog_error)
    }
}
