//! Account management on top of a [`UserRepository`].
//!
//! Everything returned from here is a [`PrincipalView`]; hashes and salts stay
//! inside the repository.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use super::access::{insufficient_permissions, PrincipalDirectory};
use super::error::AuthError;
use super::login::USER_NOT_FOUND;
use super::principal::{NewPrincipal, Principal, PrincipalView, Role, MAX_RETRIES};
use super::repo::{UserRepository, UserUpdate};
use super::utils::valid_email;
use crate::password::{check_policy, new_salt, CredentialVault};

pub const DEFAULT_PASSWORD: &str = "changeme";

/// Accounts created by [`UserService::seed_default_accounts`].
pub const DEFAULT_ACCOUNTS: [(&str, &str, &str, Role); 3] = [
    ("admin", "admin@example.com", "Administrator", Role::Admin),
    ("johndoe", "johndoe@example.com", "John Doe", Role::User),
    ("janedoe", "janedoe@example.com", "Jane Doe", Role::Reader),
];

/// Either key identifies a principal.
#[derive(Clone, Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserLookup {
    pub id: Option<i64>,
    pub username: Option<String>,
}

#[derive(Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password: String,
    pub role: Role,
}

/// Partial change set; absent fields stay as stored.
#[derive(Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserChanges {
    pub id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

fn invalid_email() -> AuthError {
    AuthError::InvalidProperty("'email' is not a valid email address.".to_string())
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    vault: CredentialVault,
}

impl UserService {
    #[must_use]
    pub fn new(repo: Arc<dyn UserRepository>, vault: CredentialVault) -> Self {
        Self { repo, vault }
    }

    /// `owner` confines the lookup to that principal id; pass it for calls
    /// admitted by the owner rule.
    ///
    /// # Errors
    /// `MissingField` if the lookup is empty, `NotFound` if nothing matches,
    /// `InsufficientPermissions` if the lookup names anyone but `owner`.
    pub async fn get_user(
        &self,
        lookup: &UserLookup,
        owner: Option<i64>,
    ) -> Result<PrincipalView, AuthError> {
        if let (Some(owner), Some(id)) = (owner, lookup.id) {
            if id != owner {
                warn!(owner, target_id = id, "owner lookup names another principal");
                return Err(insufficient_permissions());
            }
        }

        let found = if let Some(id) = lookup.id {
            self.repo.find_by_id(id).await?
        } else if let Some(username) = lookup.username.as_deref().filter(|u| !u.is_empty()) {
            self.repo.find_by_username(username).await?
        } else {
            return Err(AuthError::MissingField("'id' or 'username' is required.".to_string()));
        };

        match (found, owner) {
            (Some(principal), Some(owner)) if principal.id != owner => {
                warn!(owner, target_id = principal.id, "owner lookup names another principal");
                Err(insufficient_permissions())
            }
            (Some(principal), _) => Ok(principal.view()),
            // An unknown username must not tell an owner whether it exists.
            (None, Some(owner)) if lookup.id != Some(owner) => Err(insufficient_permissions()),
            (None, _) => Err(AuthError::NotFound(USER_NOT_FOUND.to_string())),
        }
    }

    /// # Errors
    /// Repository failures.
    pub async fn list_users(&self) -> Result<Vec<PrincipalView>, AuthError> {
        Ok(self
            .repo
            .find_all()
            .await?
            .iter()
            .map(Principal::view)
            .collect())
    }

    /// # Errors
    /// `MissingField` for blank fields, `PasswordPolicy` for a weak password,
    /// `Conflict` for a taken username or email.
    pub async fn create_user(&self, user: NewUser) -> Result<PrincipalView, AuthError> {
        for (field, value) in [
            ("username", &user.username),
            ("email", &user.email),
            ("fullname", &user.fullname),
            ("password", &user.password),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::MissingField(format!("'{field}' is required.")));
            }
        }
        if !valid_email(user.email.trim()) {
            return Err(invalid_email());
        }
        check_policy(&user.password).map_err(AuthError::PasswordPolicy)?;

        let created = self
            .insert(
                user.username.trim(),
                user.email.trim(),
                &user.fullname,
                &user.password,
                user.role,
            )
            .await?;
        info!(user_id = created.id, role = %created.role, "user created");
        Ok(created.view())
    }

    /// With `owner` set the change set must target that id and leave the role
    /// alone; only role-based grants change roles.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `PasswordPolicy` for a weak new password,
    /// `Conflict` for a taken username or email, `InsufficientPermissions` for
    /// an owner touching another record or a role.
    pub async fn update_user(
        &self,
        changes: UserChanges,
        owner: Option<i64>,
    ) -> Result<PrincipalView, AuthError> {
        if let Some(owner) = owner {
            if changes.id != owner {
                warn!(owner, target_id = changes.id, "owner update names another principal");
                return Err(insufficient_permissions());
            }
            if changes.role.is_some() {
                warn!(owner, "owner tried to change their own role");
                return Err(insufficient_permissions());
            }
        }

        let stored = self
            .repo
            .find_by_id(changes.id)
            .await?
            .ok_or_else(|| AuthError::NotFound(USER_NOT_FOUND.to_string()))?;

        if changes
            .email
            .as_deref()
            .is_some_and(|email| !valid_email(email.trim()))
        {
            return Err(invalid_email());
        }

        let mut update = UserUpdate::new(changes.id);
        update.username = changes.username.map(|u| u.trim().to_string());
        update.email = changes.email.map(|e| e.trim().to_string());
        update.fullname = changes.fullname;
        update.role = changes.role;

        if let Some(password) = changes.password {
            check_policy(&password).map_err(AuthError::PasswordPolicy)?;
            update.password_hash = Some(self.vault.hash_blocking(&password, &stored.salt).await?);
        }

        let updated = self.repo.update(update).await?;
        info!(user_id = updated.id, "user updated");
        Ok(updated.view())
    }

    /// # Errors
    /// `NotFound` if the id does not exist.
    pub async fn delete_user(&self, id: i64) -> Result<(), AuthError> {
        if !self.repo.delete_by_id(id).await? {
            return Err(AuthError::NotFound(USER_NOT_FOUND.to_string()));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }

    /// Create any missing default account and warn about accounts that still
    /// accept the default password. Returns how many were created.
    ///
    /// # Errors
    /// Repository or hashing failures.
    pub async fn seed_default_accounts(&self) -> Result<usize, AuthError> {
        let mut created = 0;
        for (username, email, fullname, role) in DEFAULT_ACCOUNTS {
            match self.repo.find_by_username(username).await? {
                Some(existing) => {
                    let still_default = self
                        .vault
                        .validate_blocking(DEFAULT_PASSWORD, &existing.salt, &existing.password_hash)
                        .await
                        .unwrap_or(false);
                    if still_default {
                        warn!(username, "default account still uses the default password");
                    }
                }
                None => {
                    self.insert(username, email, fullname, DEFAULT_PASSWORD, role)
                        .await?;
                    warn!(username, "created default account with the default password");
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    async fn insert(
        &self,
        username: &str,
        email: &str,
        fullname: &str,
        password: &str,
        role: Role,
    ) -> Result<Principal, AuthError> {
        let salt = new_salt();
        let password_hash = self.vault.hash_blocking(password, &salt).await?;
        Ok(self
            .repo
            .create(NewPrincipal {
                username: username.to_string(),
                email: email.to_string(),
                fullname: fullname.to_string(),
                password_hash,
                salt,
                role,
                retries: MAX_RETRIES,
            })
            .await?)
    }
}

#[async_trait]
impl PrincipalDirectory for UserService {
    async fn principal_by_id(&self, id: i64) -> Result<Option<Principal>, AuthError> {
        Ok(self.repo.find_by_id(id).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::principal::PrincipalStatus;
    use crate::auth::repo::InMemoryUserRepository;

    fn service() -> (UserService, Arc<InMemoryUserRepository>) {
        let repo = Arc::new(InMemoryUserRepository::new());
        let vault = CredentialVault::with_cost(4).unwrap();
        (UserService::new(repo.clone(), vault), repo)
    }

    fn alice() -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            fullname: "Alice Liddell".to_string(),
            password: "Wonder!and1".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_then_lookup_both_ways() {
        let (service, repo) = service();
        let created = service.create_user(alice()).await.unwrap();
        assert_eq!(created.retries, MAX_RETRIES);
        assert_eq!(created.status, PrincipalStatus::Active);

        let by_id = service
            .get_user(&UserLookup { id: Some(created.id), username: None }, None)
            .await
            .unwrap();
        let by_name = service
            .get_user(&UserLookup { id: None, username: Some("alice".to_string()) }, None)
            .await
            .unwrap();
        assert_eq!(by_id, by_name);

        let stored = repo.find_by_id(created.id).await.unwrap().unwrap();
        let vault = CredentialVault::with_cost(4).unwrap();
        assert!(vault.validate("Wonder!and1", &stored.salt, &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn lookup_errors() {
        let (service, _) = service();
        assert!(matches!(
            service.get_user(&UserLookup::default(), None).await,
            Err(AuthError::MissingField(_))
        ));
        assert!(matches!(
            service.get_user(&UserLookup { id: Some(7), username: None }, None).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_enforces_policy_and_uniqueness() {
        let (service, _) = service();

        let mut weak = alice();
        weak.password = "weak".to_string();
        assert!(matches!(
            service.create_user(weak).await,
            Err(AuthError::PasswordPolicy(_))
        ));

        let mut malformed = alice();
        malformed.email = "alice.example.com".to_string();
        assert!(matches!(
            service.create_user(malformed).await,
            Err(AuthError::InvalidProperty(_))
        ));

        let mut blank = alice();
        blank.email = " ".to_string();
        assert!(matches!(
            service.create_user(blank).await,
            Err(AuthError::MissingField(ref m)) if m == "'email' is required."
        ));

        service.create_user(alice()).await.unwrap();
        assert!(matches!(
            service.create_user(alice()).await,
            Err(AuthError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_rehashes_password_with_stored_salt() {
        let (service, repo) = service();
        let created = service.create_user(alice()).await.unwrap();
        let before = repo.find_by_id(created.id).await.unwrap().unwrap();

        let updated = service
            .update_user(UserChanges {
                id: created.id,
                password: Some("Looking.Gl4ss".to_string()),
                role: Some(Role::Reader),
                ..UserChanges::default()
            }, None)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Reader);
        assert_eq!(updated.fullname, "Alice Liddell");

        let after = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(after.salt, before.salt);
        assert_ne!(after.password_hash, before.password_hash);
        let vault = CredentialVault::with_cost(4).unwrap();
        assert!(vault.validate("Looking.Gl4ss", &after.salt, &after.password_hash).unwrap());

        assert!(matches!(
            service
                .update_user(UserChanges {
                    id: created.id,
                    password: Some("short".to_string()),
                    ..UserChanges::default()
                }, None)
                .await,
            Err(AuthError::PasswordPolicy(_))
        ));
        assert!(matches!(
            service
                .update_user(UserChanges { id: 99, ..UserChanges::default() }, None)
                .await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn owner_scope_confines_lookups() {
        let (service, _) = service();
        let owner = service.create_user(alice()).await.unwrap();
        let mut bob = alice();
        bob.username = "bob".to_string();
        bob.email = "bob@example.com".to_string();
        let bob = service.create_user(bob).await.unwrap();

        let own = service
            .get_user(&UserLookup { id: Some(owner.id), username: None }, Some(owner.id))
            .await
            .unwrap();
        assert_eq!(own.username, "alice");

        for lookup in [
            UserLookup { id: Some(bob.id), username: None },
            UserLookup { id: None, username: Some("bob".to_string()) },
            UserLookup { id: None, username: Some("nobody".to_string()) },
        ] {
            assert!(matches!(
                service.get_user(&lookup, Some(owner.id)).await,
                Err(AuthError::InsufficientPermissions(_))
            ));
        }
    }

    #[tokio::test]
    async fn owner_scope_confines_updates() {
        let (service, repo) = service();
        let owner = service.create_user(alice()).await.unwrap();

        assert!(matches!(
            service
                .update_user(UserChanges { id: owner.id + 1, ..UserChanges::default() }, Some(owner.id))
                .await,
            Err(AuthError::InsufficientPermissions(_))
        ));
        assert!(matches!(
            service
                .update_user(
                    UserChanges { id: owner.id, role: Some(Role::Admin), ..UserChanges::default() },
                    Some(owner.id)
                )
                .await,
            Err(AuthError::InsufficientPermissions(_))
        ));
        assert_eq!(repo.find_by_id(owner.id).await.unwrap().unwrap().role, Role::User);

        let renamed = service
            .update_user(
                UserChanges {
                    id: owner.id,
                    fullname: Some("Alice L.".to_string()),
                    ..UserChanges::default()
                },
                Some(owner.id),
            )
            .await
            .unwrap();
        assert_eq!(renamed.fullname, "Alice L.");
    }

    #[tokio::test]
    async fn delete_and_list() {
        let (service, _) = service();
        let created = service.create_user(alice()).await.unwrap();
        assert_eq!(service.list_users().await.unwrap().len(), 1);

        service.delete_user(created.id).await.unwrap();
        assert!(service.list_users().await.unwrap().is_empty());
        assert!(matches!(
            service.delete_user(created.id).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let (service, repo) = service();
        assert_eq!(service.seed_default_accounts().await.unwrap(), 3);
        assert_eq!(service.seed_default_accounts().await.unwrap(), 0);

        let jane = repo.find_by_username("janedoe").await.unwrap().unwrap();
        assert_eq!(jane.role, Role::Reader);
    }

    #[tokio::test]
    async fn service_is_a_principal_directory() {
        let (service, _) = service();
        let created = service.create_user(alice()).await.unwrap();
        let found = service.principal_by_id(created.id).await.unwrap();
        assert_eq!(found.map(|p| p.username), Some("alice".to_string()));
    }
}
