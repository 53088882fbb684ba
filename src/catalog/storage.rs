//! PostgreSQL-backed [`ProductRepository`].

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

use super::product::{NewProduct, Product, ProductUpdate};
use super::repo::{ProductRepository, NAME_TAKEN};
use crate::auth::RepositoryError;

pub const SCHEMA: &str = include_str!("../../sql/products.sql");

#[derive(Clone, Debug)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `products` table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
    })
}

fn name_conflict_or(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::Conflict(NAME_TAKEN.to_string())
        }
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        let query = "SELECT id, name, price FROM products WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, RepositoryError> {
        let query = "SELECT id, name, price FROM products WHERE name = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(name)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    async fn find_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let query = "SELECT id, name, price FROM products ORDER BY id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        Ok(rows
            .iter()
            .map(product_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let query = "INSERT INTO products (name, price) VALUES ($1, $2) RETURNING id, name, price";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&product.name)
            .bind(product.price)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(name_conflict_or)?;

        Ok(product_from_row(&row)?)
    }

    async fn update(&self, update: ProductUpdate) -> Result<Product, RepositoryError> {
        let query = r"
            UPDATE products SET
                name = COALESCE($2, name),
                price = COALESCE($3, price)
            WHERE id = $1
            RETURNING id, name, price
            ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(update.id)
            .bind(update.name.as_deref())
            .bind(update.price)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(name_conflict_or)?
            .ok_or(RepositoryError::NotFound)?;

        Ok(product_from_row(&row)?)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError> {
        let query = "DELETE FROM products WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let query = "SELECT COUNT(*) AS total FROM products";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.try_get("total")?)
    }
}
