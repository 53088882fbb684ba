//! Role and ownership checks in front of protected operations.
//!
//! Flow Overview:
//! 1) Take the bearer token from the `authorization` header, or from a token
//!    attached to the call when there is no header.
//! 2) Unwrap it to get the authenticated principal id.
//! 3) When `owner` is required, find the target id in headers, then query,
//!    then body (keys `id`, `userId`, `user_id`, case-insensitive). A match
//!    grants without looking at roles; a mismatch denies if `owner` was the
//!    only requirement.
//! 4) Otherwise resolve the principal through the configured
//!    [`PrincipalDirectory`] and check its stored role.
//!
//! Authentication, not-found, permission and missing-field failures keep
//! their kind. Anything else becomes a generic authorization failure.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::error::AuthError;
use super::principal::{Principal, Role, RoleSet};
use super::repo::UserRepository;
use super::utils::strip_bearer;
use crate::token::{Claims, TokenCodec};

pub const INSUFFICIENT_PERMISSIONS: &str = "User does not have the required permissions";
pub const OWNERSHIP_UNVERIFIED: &str = "Record ownership could not be verified";

const TARGET_ID_KEYS: [&str; 3] = ["id", "userid", "user_id"];

/// Looks principals up by id for role resolution.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn principal_by_id(&self, id: i64) -> Result<Option<Principal>, AuthError>;
}

#[async_trait]
impl<R> PrincipalDirectory for R
where
    R: UserRepository + ?Sized,
{
    async fn principal_by_id(&self, id: i64) -> Result<Option<Principal>, AuthError> {
        Ok(self.find_by_id(id).await?)
    }
}

/// The parts of an incoming call the controller looks at.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    headers: Map<String, Value>,
    query: Map<String, Value>,
    body: Map<String, Value>,
    token: Option<String>,
}

impl CallContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Header names are stored lower-cased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), Value::String(value.into()));
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query
            .insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// Body fields; a body that is not a JSON object carries none.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        if let Value::Object(fields) = body {
            self.body = fields;
        }
        self
    }

    /// A token handed over without an `authorization` header.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn bearer(&self) -> Option<&str> {
        if let Some(header) = self.headers.get("authorization") {
            return header.as_str().and_then(strip_bearer);
        }
        self.token
            .as_deref()
            .map(|token| strip_bearer(token).unwrap_or(token).trim())
            .filter(|token| !token.is_empty())
    }

    /// First target identifier across headers, query, then body.
    #[must_use]
    pub fn target_id(&self) -> Option<String> {
        [&self.headers, &self.query, &self.body]
            .into_iter()
            .find_map(|source| {
                TARGET_ID_KEYS.iter().find_map(|wanted| {
                    source
                        .iter()
                        .find(|(key, _)| key.to_ascii_lowercase() == *wanted)
                        .and_then(|(_, value)| scalar(value))
                })
            })
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// How access was granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantBasis {
    Owner,
    Role(Role),
}

/// Outcome of a successful check.
#[derive(Clone, Debug)]
pub struct AccessGrant {
    pub principal_id: String,
    pub basis: GrantBasis,
    pub claims: Claims,
    /// The target id the owner rule matched. Set only for owner grants.
    pub target_id: Option<String>,
}

impl AccessGrant {
    /// The single principal id an owner grant may act on; `None` when access
    /// came from a role.
    ///
    /// # Errors
    /// `InsufficientPermissions` for an owner grant without a numeric target.
    pub fn owned_id(&self) -> Result<Option<i64>, AuthError> {
        match self.basis {
            GrantBasis::Role(_) => Ok(None),
            GrantBasis::Owner => self
                .target_id
                .as_deref()
                .and_then(|id| id.parse::<i64>().ok())
                .map(Some)
                .ok_or_else(insufficient_permissions),
        }
    }
}

pub(crate) fn insufficient_permissions() -> AuthError {
    AuthError::InsufficientPermissions(INSUFFICIENT_PERMISSIONS.to_string())
}

/// Decides grant or deny for one configured role set.
#[derive(Clone)]
pub struct AccessController {
    roles: RoleSet,
    tokens: TokenCodec,
    directory: Arc<dyn PrincipalDirectory>,
}

impl AccessController {
    #[must_use]
    pub fn new(roles: RoleSet, tokens: TokenCodec, directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self {
            roles,
            tokens,
            directory,
        }
    }

    /// Same collaborators, different requirement.
    #[must_use]
    pub fn with_roles(&self, roles: RoleSet) -> Self {
        Self {
            roles,
            tokens: self.tokens.clone(),
            directory: self.directory.clone(),
        }
    }

    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// # Errors
    /// The denial reason; see the module docs for which kinds are kept.
    pub async fn authorize(&self, call: &CallContext) -> Result<AccessGrant, AuthError> {
        match self.evaluate(call).await {
            Ok(grant) => Ok(grant),
            Err(err) if err.is_specific() => {
                debug!(roles = %self.roles, "access denied: {err}");
                Err(err)
            }
            Err(err) => {
                error!(roles = %self.roles, "authorization failed: {err}");
                Err(AuthError::AuthorizationFailed)
            }
        }
    }

    async fn evaluate(&self, call: &CallContext) -> Result<AccessGrant, AuthError> {
        let token = call
            .bearer()
            .ok_or_else(|| AuthError::Authentication("Authentication required".to_string()))?;

        let claims = self.tokens.unwrap(token)?;
        let principal_id = claims.id().ok_or_else(|| {
            warn!("token carries no principal id");
            AuthError::InvalidToken
        })?;

        if self.roles.requires_owner() {
            let target = call
                .target_id()
                .ok_or_else(|| AuthError::MissingField(OWNERSHIP_UNVERIFIED.to_string()))?;

            if target == principal_id {
                return Ok(AccessGrant {
                    principal_id,
                    basis: GrantBasis::Owner,
                    claims,
                    target_id: Some(target),
                });
            }

            if self.roles.owner_only() {
                warn!(
                    principal_id = %principal_id,
                    target_id = %target,
                    "principal cannot act on behalf of another"
                );
                return Err(insufficient_permissions());
            }
        }

        let not_found = || AuthError::NotFound("User not found".to_string());
        let id: i64 = principal_id.parse().map_err(|_| not_found())?;
        let principal = self
            .directory
            .principal_by_id(id)
            .await?
            .ok_or_else(not_found)?;

        if !self.roles.admits(principal.role) {
            warn!(
                principal_id = %principal_id,
                role = %principal.role,
                required = %self.roles,
                "principal lacks the required role"
            );
            return Err(insufficient_permissions());
        }

        Ok(AccessGrant {
            principal_id,
            basis: GrantBasis::Role(principal.role),
            claims,
            target_id: None,
        })
    }
}
