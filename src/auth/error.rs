//! Error kinds raised by the login and authorization flows.

use thiserror::Error;

use super::repo::RepositoryError;
use crate::cipher::CryptoError;
use crate::password::PasswordError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Crypto(CryptoError),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Expired token")]
    ExpiredToken,
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    AccountLocked(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InsufficientPermissions(String),
    #[error("{0}")]
    MissingField(String),
    #[error("{0}")]
    PasswordPolicy(String),
    #[error("{0}")]
    InvalidProperty(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Authorization failed")]
    AuthorizationFailed,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Kinds that keep their identity when they cross the authorization stage.
    #[must_use]
    pub fn is_specific(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::AuthorizationFailed)
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Crypto(err) => Self::Crypto(err),
            TokenError::Invalid => Self::InvalidToken,
            TokenError::Expired => Self::ExpiredToken,
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("User not found".to_string()),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Internal(other.to_string()),
        }
    }
}
