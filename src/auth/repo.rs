//! Persistence seam for principals.
//!
//! Partial updates only touch the fields they carry. Lockout bookkeeping sets
//! `expected_retries`, turning the update into a compare-and-swap: the
//! repository applies it only while the stored counter still holds that value
//! and answers [`RepositoryError::Stale`] otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

use super::principal::{NewPrincipal, Principal, Role};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("record changed concurrently")]
    Stale,
}

/// Partial update of one principal. `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    pub id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub retries: Option<i32>,
    /// `Some(None)` clears the lock timestamp.
    pub locked_until: Option<Option<DateTime<Utc>>>,
    pub expected_retries: Option<i32>,
}

impl UserUpdate {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_retries(mut self, retries: i32) -> Self {
        self.retries = Some(retries);
        self
    }

    #[must_use]
    pub fn with_locked_until(mut self, locked_until: Option<DateTime<Utc>>) -> Self {
        self.locked_until = Some(locked_until);
        self
    }

    /// Apply only if the stored retries still equal `retries`.
    #[must_use]
    pub fn expecting_retries(mut self, retries: i32) -> Self {
        self.expected_retries = Some(retries);
        self
    }

    fn apply(&self, principal: &mut Principal) {
        if let Some(username) = &self.username {
            principal.username.clone_from(username);
        }
        if let Some(email) = &self.email {
            principal.email.clone_from(email);
        }
        if let Some(fullname) = &self.fullname {
            principal.fullname.clone_from(fullname);
        }
        if let Some(password_hash) = &self.password_hash {
            principal.password_hash.clone_from(password_hash);
        }
        if let Some(role) = self.role {
            principal.role = role;
        }
        if let Some(retries) = self.retries {
            principal.retries = retries;
        }
        if let Some(locked_until) = self.locked_until {
            principal.locked_until = locked_until;
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, RepositoryError>;
    async fn find_all(&self) -> Result<Vec<Principal>, RepositoryError>;
    async fn create(&self, principal: NewPrincipal) -> Result<Principal, RepositoryError>;
    /// # Errors
    /// [`RepositoryError::NotFound`] for an unknown id, [`RepositoryError::Stale`]
    /// when `expected_retries` no longer matches.
    async fn update(&self, update: UserUpdate) -> Result<Principal, RepositoryError>;
    /// Returns whether a record was removed.
    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[derive(Debug, Default)]
struct Records {
    next_id: i64,
    users: BTreeMap<i64, Principal>,
}

impl Records {
    fn taken(&self, skip: Option<i64>, username: Option<&str>, email: Option<&str>) -> Option<String> {
        self.users
            .values()
            .filter(|user| Some(user.id) != skip)
            .find_map(|user| {
                if username.is_some_and(|name| name == user.username) {
                    Some("Username already exists.".to_string())
                } else if email.is_some_and(|email| email == user.email) {
                    Some("Email already exists.".to_string())
                } else {
                    None
                }
            })
    }
}

/// Process-local repository for tests and single-node development.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    records: RwLock<Records>,
}

impl InMemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, RepositoryError> {
        Ok(self.records.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<Principal>, RepositoryError> {
        Ok(self.records.read().await.users.values().cloned().collect())
    }

    async fn create(&self, principal: NewPrincipal) -> Result<Principal, RepositoryError> {
        let mut records = self.records.write().await;
        if let Some(message) = records.taken(
            None,
            Some(principal.username.as_str()),
            Some(principal.email.as_str()),
        ) {
            return Err(RepositoryError::Conflict(message));
        }

        records.next_id += 1;
        let created = Principal {
            id: records.next_id,
            username: principal.username,
            email: principal.email,
            fullname: principal.fullname,
            password_hash: principal.password_hash,
            salt: principal.salt,
            role: principal.role,
            retries: principal.retries,
            locked_until: None,
        };
        records.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, update: UserUpdate) -> Result<Principal, RepositoryError> {
        let mut records = self.records.write().await;
        if let Some(message) = records.taken(
            Some(update.id),
            update.username.as_deref(),
            update.email.as_deref(),
        ) {
            return Err(RepositoryError::Conflict(message));
        }

        let principal = records
            .users
            .get_mut(&update.id)
            .ok_or(RepositoryError::NotFound)?;
        if update
            .expected_retries
            .is_some_and(|expected| expected != principal.retries)
        {
            return Err(RepositoryError::Stale);
        }

        update.apply(principal);
        Ok(principal.clone())
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError> {
        Ok(self.records.write().await.users.remove(&id).is_some())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let records = self.records.read().await;
        Ok(i64::try_from(records.users.len()).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::MAX_RETRIES;

    fn new_principal(username: &str) -> NewPrincipal {
        NewPrincipal {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            fullname: username.to_string(),
            password_hash: "hash".to_string(),
            salt: "salt".to_string(),
            role: Role::User,
            retries: MAX_RETRIES,
        }
    }

    #[tokio::test]
    async fn create_and_find() -> Result<(), RepositoryError> {
        let repo = InMemoryUserRepository::new();
        let first = repo.create(new_principal("alice")).await?;
        let second = repo.create(new_principal("bob")).await?;

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(repo.find_by_id(2).await?.map(|p| p.username), Some("bob".to_string()));
        assert_eq!(repo.find_by_username("alice").await?.map(|p| p.id), Some(1));
        assert!(repo.find_by_username("carol").await?.is_none());
        assert_eq!(repo.count().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn duplicates_conflict() -> Result<(), RepositoryError> {
        let repo = InMemoryUserRepository::new();
        repo.create(new_principal("alice")).await?;

        let mut clash = new_principal("alice2");
        clash.email = "alice@example.com".to_string();
        assert!(matches!(
            repo.create(clash).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(matches!(
            repo.create(new_principal("alice")).await,
            Err(RepositoryError::Conflict(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn partial_update_touches_only_supplied_fields() -> Result<(), RepositoryError> {
        let repo = InMemoryUserRepository::new();
        let created = repo.create(new_principal("alice")).await?;

        let mut update = UserUpdate::new(created.id).with_retries(1);
        update.fullname = Some("Alice Liddell".to_string());
        let updated = repo.update(update).await?;

        assert_eq!(updated.retries, 1);
        assert_eq!(updated.fullname, "Alice Liddell");
        assert_eq!(updated.username, created.username);
        assert_eq!(updated.password_hash, created.password_hash);
        assert_eq!(updated.locked_until, None);
        Ok(())
    }

    #[tokio::test]
    async fn compare_and_swap_on_retries() -> Result<(), RepositoryError> {
        let repo = InMemoryUserRepository::new();
        let created = repo.create(new_principal("alice")).await?;

        let first = UserUpdate::new(created.id).with_retries(2).expecting_retries(3);
        let racing = UserUpdate::new(created.id).with_retries(2).expecting_retries(3);

        assert_eq!(repo.update(first).await?.retries, 2);
        assert!(matches!(repo.update(racing).await, Err(RepositoryError::Stale)));
        Ok(())
    }

    #[tokio::test]
    async fn update_and_delete_unknown() -> Result<(), RepositoryError> {
        let repo = InMemoryUserRepository::new();
        assert!(matches!(
            repo.update(UserUpdate::new(9).with_retries(3)).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(!repo.delete_by_id(9).await?);

        let created = repo.create(new_principal("alice")).await?;
        assert!(repo.delete_by_id(created.id).await?);
        assert_eq!(repo.count().await?, 0);
        Ok(())
    }
}
