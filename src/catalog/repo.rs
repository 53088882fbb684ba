//! Persistence seam for the catalog.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::product::{NewProduct, Product, ProductUpdate};
use crate::auth::RepositoryError;

pub const NAME_TAKEN: &str = "Product name already exists.";

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Product>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, RepositoryError>;
    async fn find_all(&self) -> Result<Vec<Product>, RepositoryError>;
    /// # Errors
    /// [`RepositoryError::Conflict`] for a taken name.
    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError>;
    /// # Errors
    /// [`RepositoryError::NotFound`] for an unknown id, [`RepositoryError::Conflict`]
    /// for a taken name.
    async fn update(&self, update: ProductUpdate) -> Result<Product, RepositoryError>;
    /// Returns whether a record was removed.
    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[derive(Debug, Default)]
struct Catalog {
    next_id: i64,
    products: BTreeMap<i64, Product>,
}

impl Catalog {
    fn name_taken(&self, name: &str, skip: Option<i64>) -> bool {
        self.products
            .values()
            .any(|product| Some(product.id) != skip && product.name == name)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    catalog: RwLock<Catalog>,
}

impl InMemoryProductRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        Ok(self.catalog.read().await.products.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, RepositoryError> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .products
            .values()
            .find(|product| product.name == name)
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(self.catalog.read().await.products.values().cloned().collect())
    }

    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut catalog = self.catalog.write().await;
        if catalog.name_taken(&product.name, None) {
            return Err(RepositoryError::Conflict(NAME_TAKEN.to_string()));
        }

        catalog.next_id += 1;
        let created = Product {
            id: catalog.next_id,
            name: product.name,
            price: product.price,
        };
        catalog.products.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, update: ProductUpdate) -> Result<Product, RepositoryError> {
        let mut catalog = self.catalog.write().await;
        if update
            .name
            .as_deref()
            .is_some_and(|name| catalog.name_taken(name, Some(update.id)))
        {
            return Err(RepositoryError::Conflict(NAME_TAKEN.to_string()));
        }

        let product = catalog
            .products
            .get_mut(&update.id)
            .ok_or(RepositoryError::NotFound)?;
        update.apply(product);
        Ok(product.clone())
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError> {
        Ok(self.catalog.write().await.products.remove(&id).is_some())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let catalog = self.catalog.read().await;
        Ok(i64::try_from(catalog.products.len()).unwrap_or(i64::MAX))
    }
}
