//! Username/password login with a retry-counter lockout.
//!
//! A principal is ACTIVE while it has retries left or its lock window has
//! passed, and LOCKED while `retries < 1 && now < locked_until`. The lock is
//! checked before the password so a locked account never reveals whether the
//! supplied password was right. Leaving LOCKED needs no transition: the next
//! attempt after `locked_until` is evaluated normally.
//!
//! Each failed attempt decrements the counter and pushes `locked_until` to
//! `now + max(|retries| * 3, 5)` minutes. The write is a compare-and-swap on
//! the counter, so two concurrent failures never both persist the same stale
//! value.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::principal::{Principal, MAX_RETRIES};
use super::repo::{RepositoryError, UserRepository, UserUpdate};
use crate::password::CredentialVault;
use crate::token::{Claims, TokenCodec};

const CAS_ATTEMPTS: usize = 5;
const MIN_LOCK_MINUTES: i64 = 5;
const LOCK_MINUTES_PER_RETRY: i64 = 3;

pub const USER_NOT_FOUND: &str = "User not found";
pub const LOCKED_MESSAGE: &str = "User is locked temporarily. Please try again later.";
pub const TOO_MANY_ATTEMPTS: &str = "Too many failed login attempts.";

#[derive(Clone)]
pub struct LoginGuard {
    repo: Arc<dyn UserRepository>,
    tokens: TokenCodec,
    vault: CredentialVault,
}

impl LoginGuard {
    #[must_use]
    pub fn new(repo: Arc<dyn UserRepository>, tokens: TokenCodec, vault: CredentialVault) -> Self {
        Self {
            repo,
            tokens,
            vault,
        }
    }

    /// Check credentials and issue a token carrying `{id, source}`.
    ///
    /// # Errors
    /// `NotFound` for an unknown username, `AccountLocked` while locked or when
    /// this failure spends the last retry, `Authentication` with the retries
    /// left otherwise.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client_context: &str,
    ) -> Result<String, AuthError> {
        let principal = self.find_by_username(username).await?;

        if principal.is_locked_at(Utc::now()) {
            warn!(user_id = principal.id, "login rejected: account locked");
            return Err(AuthError::AccountLocked(LOCKED_MESSAGE.to_string()));
        }

        let valid = self
            .vault
            .validate_blocking(password, &principal.salt, &principal.password_hash)
            .await?;

        if valid {
            if principal.retries < MAX_RETRIES {
                self.repo
                    .update(UserUpdate::new(principal.id).with_retries(MAX_RETRIES))
                    .await?;
            }
            info!(user_id = principal.id, "login succeeded");
            let claims = Claims::new()
                .with_number("id", principal.id)
                .with_str("source", client_context);
            return Ok(self.tokens.generate(claims, None)?);
        }

        let user_id = principal.id;
        let retries = self.record_failure(principal).await?;
        warn!(user_id, retries_left = retries, "login failed: bad credentials");
        if retries <= 0 {
            Err(AuthError::AccountLocked(TOO_MANY_ATTEMPTS.to_string()))
        } else {
            Err(AuthError::Authentication(format!(
                "Authentication failed. Retries left: {retries}."
            )))
        }
    }

    /// Persist one failed attempt and return the new retry count.
    async fn record_failure(&self, mut principal: Principal) -> Result<i32, AuthError> {
        for attempt in 1..=CAS_ATTEMPTS {
            let retries = principal.retries - 1;
            let update = UserUpdate::new(principal.id)
                .with_retries(retries)
                .with_locked_until(Some(lock_deadline(Utc::now(), retries)))
                .expecting_retries(principal.retries);

            match self.repo.update(update).await {
                Ok(_) => return Ok(retries),
                Err(RepositoryError::Stale) => {
                    debug!(user_id = principal.id, attempt, "lockout update raced, re-reading");
                    principal = self
                        .repo
                        .find_by_id(principal.id)
                        .await?
                        .ok_or_else(|| AuthError::NotFound(USER_NOT_FOUND.to_string()))?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(user_id = principal.id, "lockout update kept racing, giving up");
        Err(AuthError::Internal("concurrent lockout updates".to_string()))
    }

    /// Resolve the principal a token was issued to.
    ///
    /// # Errors
    /// Token errors as-is; `NotFound` if the id no longer resolves.
    pub async fn authenticated_principal(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.tokens.unwrap(token)?;
        let id = claims.id().ok_or(AuthError::InvalidToken)?;
        let id: i64 = id
            .parse()
            .map_err(|_| AuthError::NotFound(USER_NOT_FOUND.to_string()))?;

        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::NotFound(USER_NOT_FOUND.to_string()))
    }

    /// Claims of a valid token.
    ///
    /// # Errors
    /// Any token error.
    pub fn token_claims(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(self.tokens.unwrap(token)?)
    }

    /// Re-issue a token with the same claims and a fresh expiry.
    ///
    /// # Errors
    /// Any token error.
    pub fn refresh_token(&self, token: &str) -> Result<String, AuthError> {
        Ok(self.tokens.refresh(token)?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Principal, AuthError> {
        self.repo
            .find_by_username(username)
            .await?
            .ok_or_else(|| AuthError::NotFound(USER_NOT_FOUND.to_string()))
    }
}

fn lock_deadline(now: DateTime<Utc>, retries: i32) -> DateTime<Utc> {
    let minutes = (i64::from(retries).abs() * LOCK_MINUTES_PER_RETRY).max(MIN_LOCK_MINUTES);
    now + Duration::minutes(minutes)
}
