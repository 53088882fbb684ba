//! Stateless bearer tokens.
//!
//! A token is the JSON claims map, with an absolute `expire` (epoch seconds)
//! merged in, encrypted with [`crate::cipher`] under the application secret.
//! There is no server-side session: possession of an unexpired token that
//! decrypts under the secret is the whole check.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::cipher::{self, CryptoError, IvMode, KEY_LEN};

pub const DEFAULT_TTL_SECONDS: i64 = 360;
pub const EXPIRE_CLAIM: &str = "expire";
pub const MESSAGE_CLAIM: &str = "message";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error(transparent)]
    Crypto(CryptoError),
    #[error("Invalid token")]
    Invalid,
    #[error("Expired token")]
    Expired,
}

impl From<CryptoError> for TokenError {
    fn from(err: CryptoError) -> Self {
        match err {
            // A string that is not `iv:ct:tag` hex was never one of our tokens.
            CryptoError::Malformed => Self::Invalid,
            other => Self::Crypto(other),
        }
    }
}

/// Flat claims map carried inside a token. Values are strings or numbers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), Value::String(value.into()));
        self
    }

    #[must_use]
    pub fn with_number(mut self, key: &str, value: i64) -> Self {
        self.0.insert(key.to_string(), Value::Number(Number::from(value)));
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String form of a scalar claim: `5` and `"5"` both give `"5"`.
    #[must_use]
    pub fn scalar(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The principal id claim, if present.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.scalar("id").filter(|id| !id.is_empty())
    }

    /// The `expire` claim as epoch seconds, accepting a number or a numeric string.
    #[must_use]
    pub fn expire(&self) -> Option<i64> {
        match self.0.get(EXPIRE_CLAIM)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    fn set_expire(&mut self, expire: i64) {
        self.0
            .insert(EXPIRE_CLAIM.to_string(), Value::Number(Number::from(expire)));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// What goes into [`TokenCodec::generate`].
#[derive(Clone, Debug)]
pub enum Payload {
    /// Wrapped as `{"message": ..}`.
    Message(String),
    Claims(Claims),
}

impl From<&str> for Payload {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<String> for Payload {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<Claims> for Payload {
    fn from(claims: Claims) -> Self {
        Self::Claims(claims)
    }
}

/// Issues and opens tokens under one secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Arc<SecretString>,
    iv_mode: IvMode,
    default_ttl: i64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("iv_mode", &self.iv_mode)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// # Errors
    /// Returns [`CryptoError::KeyLength`] unless the secret is exactly 32 bytes.
    pub fn new(secret: SecretString) -> Result<Self, CryptoError> {
        let len = secret.expose_secret().len();
        if len != KEY_LEN {
            return Err(CryptoError::KeyLength(len));
        }
        Ok(Self {
            secret: Arc::new(secret),
            iv_mode: IvMode::default(),
            default_ttl: DEFAULT_TTL_SECONDS,
        })
    }

    #[must_use]
    pub fn with_iv_mode(mut self, iv_mode: IvMode) -> Self {
        self.iv_mode = iv_mode;
        self
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl_seconds: i64) -> Self {
        self.default_ttl = ttl_seconds;
        self
    }

    #[must_use]
    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    #[must_use]
    pub fn iv_mode(&self) -> IvMode {
        self.iv_mode
    }

    /// Issue a token valid for `|ttl_seconds|` (the default TTL when `None`).
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn generate(
        &self,
        payload: impl Into<Payload>,
        ttl_seconds: Option<i64>,
    ) -> Result<String, TokenError> {
        self.generate_at(payload, ttl_seconds, now())
    }

    /// [`Self::generate`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn generate_at(
        &self,
        payload: impl Into<Payload>,
        ttl_seconds: Option<i64>,
        now: i64,
    ) -> Result<String, TokenError> {
        let ttl = ttl_seconds.unwrap_or(self.default_ttl);
        let expire = now.saturating_add(ttl.saturating_abs());

        let mut claims = match payload.into() {
            Payload::Message(message) => Claims::new().with_str(MESSAGE_CLAIM, message),
            Payload::Claims(claims) => claims,
        };
        claims.set_expire(expire);

        let json = serde_json::to_vec(&claims).map_err(|_| TokenError::Invalid)?;
        Ok(cipher::encrypt(&json, self.key(), self.iv_mode)?)
    }

    /// Decrypt a token and return its claims, `expire` included.
    ///
    /// # Errors
    /// [`TokenError::Crypto`] if the token does not authenticate under this
    /// secret, [`TokenError::Invalid`] if it is not a token or has no usable
    /// `expire`, [`TokenError::Expired`] once the clock passes `expire`.
    pub fn unwrap(&self, token: &str) -> Result<Claims, TokenError> {
        self.unwrap_at(token, now())
    }

    /// [`Self::unwrap`] with an explicit clock.
    ///
    /// # Errors
    /// Same as [`Self::unwrap`].
    pub fn unwrap_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let plaintext = cipher::decrypt(token.trim(), self.key())?;
        let claims: Claims = serde_json::from_slice(&plaintext).map_err(|err| {
            debug!("token payload is not a claims object: {err}");
            TokenError::Invalid
        })?;

        let expire = claims.expire().ok_or(TokenError::Invalid)?;
        if now > expire {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// True iff [`Self::unwrap`] would succeed.
    #[must_use]
    pub fn validate(&self, token: &str) -> bool {
        self.unwrap(token).is_ok()
    }

    /// Unwrap and immediately re-issue with the same claims and a fresh expiry.
    ///
    /// # Errors
    /// Any [`Self::unwrap`] error.
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.unwrap(token)?;
        self.generate(claims, None)
    }

    fn key(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
