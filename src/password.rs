//! Password storage and verification.
//!
//! Flow Overview:
//! 1) Derive a 32-byte key with PBKDF2-HMAC-SHA256 (10,000 iterations) from
//!    the password and the per-user salt.
//! 2) Blend password and salt by alternating their characters, cycling the
//!    shorter one until the longer one is exhausted.
//! 3) Encrypt the blend with the derived key (derived IV, so the output is
//!    reproducible).
//! 4) Store the bcrypt hash of that ciphertext string.
//!
//! Validation repeats 1-3 and lets bcrypt compare. The layout has to stay
//! exactly like this or existing stored hashes stop validating.

use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;

use crate::cipher::{self, CryptoError, IvMode, KEY_LEN};

pub const PBKDF2_ITERATIONS: u32 = 10_000;
pub const DEFAULT_COST: u32 = 12;
/// bcrypt accepts costs in `MIN_COST..=MAX_COST`.
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;
pub const SALT_LEN: usize = 16;

const SPECIAL_CHARACTERS: &str = r#"!@#$%^&*(),.?":{}|<>"#;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("cipher error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("slow hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("invalid bcrypt cost {0}")]
    InvalidCost(u32),
    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Password hashing and verification with a configurable bcrypt cost.
#[derive(Clone, Copy, Debug)]
pub struct CredentialVault {
    cost: u32,
}

impl Default for CredentialVault {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl CredentialVault {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`PasswordError::InvalidCost`] outside bcrypt's `4..=31` range.
    pub fn with_cost(cost: u32) -> Result<Self, PasswordError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(PasswordError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }

    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Produce the value stored for `password`.
    ///
    /// Two calls with the same inputs give different strings (bcrypt salts
    /// internally) that both validate.
    ///
    /// # Errors
    /// Returns an error if encryption or bcrypt fails.
    pub fn hash(&self, password: &str, salt: &str) -> Result<String, PasswordError> {
        let secret = encrypt_password(password, salt)?;
        Ok(bcrypt::hash(secret, self.cost)?)
    }

    /// Check a candidate password against the stored hash.
    ///
    /// A wrong password is `Ok(false)`; only an unparsable stored hash is an error.
    ///
    /// # Errors
    /// Returns an error if `stored_hash` is not a bcrypt hash.
    pub fn validate(
        &self,
        password: &str,
        salt: &str,
        stored_hash: &str,
    ) -> Result<bool, PasswordError> {
        let secret = encrypt_password(password, salt)?;
        Ok(bcrypt::verify(secret, stored_hash)?)
    }

    /// [`Self::hash`] on the blocking pool.
    ///
    /// # Errors
    /// Same as [`Self::hash`].
    pub async fn hash_blocking(&self, password: &str, salt: &str) -> Result<String, PasswordError> {
        let vault = *self;
        let (password, salt) = (password.to_string(), salt.to_string());
        run_blocking(move || vault.hash(&password, &salt)).await
    }

    /// [`Self::validate`] on the blocking pool.
    ///
    /// # Errors
    /// Same as [`Self::validate`].
    pub async fn validate_blocking(
        &self,
        password: &str,
        salt: &str,
        stored_hash: &str,
    ) -> Result<bool, PasswordError> {
        let vault = *self;
        let (password, salt, stored_hash) =
            (password.to_string(), salt.to_string(), stored_hash.to_string());
        run_blocking(move || vault.validate(&password, &salt, &stored_hash)).await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, PasswordError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| PasswordError::Task(err.to_string()))?
}

/// Generate a new per-user salt: 16 printable characters from 16 random bytes.
#[must_use]
pub fn new_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut bytes);
    let mut salt = Base64::encode_string(&bytes);
    salt.truncate(SALT_LEN);
    salt
}

fn derive_key(password: &str, salt: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), PBKDF2_ITERATIONS, &mut key);
    key
}

/// Alternate characters of `first` and `second`, wrapping the shorter input.
///
/// An empty side contributes nothing: `blend("", "ab") == "ab"`.
///
/// Positions are Unicode scalar values. Hashes written by a UTF-16 based
/// implementation differ for passwords containing characters outside the
/// Basic Multilingual Plane, and those will not validate here.
fn blend(first: &str, second: &str) -> String {
    let a: Vec<char> = first.chars().collect();
    let b: Vec<char> = second.chars().collect();
    let rounds = a.len().max(b.len());

    let mut blended = String::with_capacity(rounds * 2);
    for i in 0..rounds {
        if let Some(c) = a.get(i % a.len().max(1)) {
            blended.push(*c);
        }
        if let Some(c) = b.get(i % b.len().max(1)) {
            blended.push(*c);
        }
    }
    blended
}

fn encrypt_password(password: &str, salt: &str) -> Result<String, CryptoError> {
    let key = derive_key(password, salt);
    let blended = blend(password, salt);
    cipher::encrypt(blended.as_bytes(), &key, IvMode::Derived)
}

/// Check a new password against the strength rules.
///
/// # Errors
/// Returns every violated rule, one message per line.
pub fn check_policy(password: &str) -> Result<(), String> {
    let mut errors = Vec::new();

    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long.");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one digit.");
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        errors.push("Password must contain at least one special character.");
    }
    if password.chars().any(char::is_whitespace) {
        errors.push("Password must not contain spaces.");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}
