//! PostgreSQL-backed [`UserRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

use super::principal::{NewPrincipal, Principal, Role};
use super::repo::{RepositoryError, UserRepository, UserUpdate};

const COLUMNS: &str =
    "id, username, email, fullname, password, salt, role, retries, locked_until";

/// Schema applied at startup; idempotent.
pub const SCHEMA: &str = include_str!("../../sql/schema.sql");

#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `users` table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the statements fail.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

fn principal_from_row(row: &PgRow) -> Result<Principal, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse::<Role>()
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

    Ok(Principal {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        fullname: row.try_get("fullname")?,
        password_hash: row.try_get("password")?,
        salt: row.try_get("salt")?,
        role,
        retries: row.try_get("retries")?,
        locked_until: row.try_get::<Option<DateTime<Utc>>, _>("locked_until")?,
    })
}

fn conflict_or(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().is_some_and(|code| code.as_ref() == "23505") {
            let message = match db_err.constraint() {
                Some(constraint) if constraint.contains("email") => "Email already exists.",
                _ => "Username already exists.",
            };
            return RepositoryError::Conflict(message.to_string());
        }
    }
    RepositoryError::Database(err)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, RepositoryError> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(principal_from_row).transpose()?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, RepositoryError> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(principal_from_row).transpose()?)
    }

    async fn find_all(&self) -> Result<Vec<Principal>, RepositoryError> {
        let query = format!("SELECT {COLUMNS} FROM users ORDER BY id");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        Ok(rows
            .iter()
            .map(principal_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create(&self, principal: NewPrincipal) -> Result<Principal, RepositoryError> {
        let query = format!(
            r"
            INSERT INTO users
                (username, email, fullname, password, salt, role, retries)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(&principal.username)
            .bind(&principal.email)
            .bind(&principal.fullname)
            .bind(&principal.password_hash)
            .bind(&principal.salt)
            .bind(principal.role.as_str())
            .bind(principal.retries)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(conflict_or)?;

        Ok(principal_from_row(&row)?)
    }

    async fn update(&self, update: UserUpdate) -> Result<Principal, RepositoryError> {
        // COALESCE keeps the stored value for every field the update leaves out.
        let query = format!(
            r"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                fullname = COALESCE($4, fullname),
                password = COALESCE($5, password),
                role = COALESCE($6, role),
                retries = COALESCE($7, retries),
                locked_until = CASE WHEN $8 THEN $9 ELSE locked_until END
            WHERE id = $1
              AND ($10::INT IS NULL OR retries = $10)
            RETURNING {COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(update.id)
            .bind(update.username.as_deref())
            .bind(update.email.as_deref())
            .bind(update.fullname.as_deref())
            .bind(update.password_hash.as_deref())
            .bind(update.role.map(Role::as_str))
            .bind(update.retries)
            .bind(update.locked_until.is_some())
            .bind(update.locked_until.flatten())
            .bind(update.expected_retries)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(conflict_or)?;

        let Some(row) = row else {
            // Nothing matched: either the id is gone or the CAS lost.
            if update.expected_retries.is_some() && self.find_by_id(update.id).await?.is_some() {
                return Err(RepositoryError::Stale);
            }
            return Err(RepositoryError::NotFound);
        };

        Ok(principal_from_row(&row)?)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError> {
        let query = "DELETE FROM users WHERE id = $1";
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
        let query = "SELECT COUNT(*) AS total FROM users";
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
