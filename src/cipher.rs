//! AES-256-GCM encryption of opaque byte strings.
//!
//! The encoded form is `<ivHex>:<ciphertextHex>:<tagHex>`, with a 16-byte IV
//! and a 16-byte authentication tag.
//!
//! ## IV selection
//!
//! [`IvMode::Derived`] computes the IV as `MD5(plaintext || key)`. Identical
//! plaintext and key always produce the identical IV and ciphertext, so an
//! observer can tell when the same value was encrypted twice. GCM's
//! confidentiality guarantees do not hold under that construction.
//!
//! > **Warning:** only use `Derived` where the output has to be reproducible
//! > (the password pipeline re-encrypts during validation) or where existing
//! > ciphertexts must be matched byte for byte. Everything else should use
//! > [`IvMode::Random`].
//!
//! Decryption reads the IV from the encoded string, so it works for both modes.

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, Aead, KeyInit},
    aes::Aes256,
    AesGcm,
};
use md5::{Digest, Md5};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("secret key must be {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),
    #[error("invalid encrypted data format")]
    Malformed,
    #[error("authentication tag mismatch")]
    TagMismatch,
    #[error("encryption failed")]
    Encrypt,
}

/// How the IV for a new ciphertext is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IvMode {
    /// Fresh IV from the OS random source.
    #[default]
    Random,
    /// `MD5(plaintext || key)`; deterministic, see the module docs.
    Derived,
}

impl std::str::FromStr for IvMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "derived" => Ok(Self::Derived),
            other => Err(format!("unknown IV mode: {other}")),
        }
    }
}

/// Encrypt `plaintext` under a 32-byte key and return the encoded string.
///
/// # Errors
/// Returns [`CryptoError::KeyLength`] if the key is not exactly 32 bytes.
pub fn encrypt(plaintext: &[u8], key: &[u8], mode: IvMode) -> Result<String, CryptoError> {
    let cipher = new_cipher(key)?;

    let iv = match mode {
        IvMode::Derived => derive_iv(plaintext, key),
        IvMode::Random => {
            let mut iv = [0u8; IV_LEN];
            OsRng.fill_bytes(&mut iv);
            iv
        }
    };

    let sealed = cipher
        .encrypt(GenericArray::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    // aes-gcm appends the tag to the ciphertext.
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(format!(
        "{}:{}:{}",
        hex::encode(iv),
        hex::encode(ciphertext),
        hex::encode(tag)
    ))
}

/// Decrypt an encoded string produced by [`encrypt`].
///
/// # Errors
/// Returns [`CryptoError::KeyLength`] for a wrong-size key,
/// [`CryptoError::Malformed`] if the input is not three hex segments of the
/// expected sizes, and [`CryptoError::TagMismatch`] if authentication fails.
pub fn decrypt(encoded: &str, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = new_cipher(key)?;

    let mut parts = encoded.split(':');
    let iv_hex = parts.next().ok_or(CryptoError::Malformed)?;
    let ciphertext_hex = parts.next().ok_or(CryptoError::Malformed)?;
    let tag_hex = parts.next().ok_or(CryptoError::Malformed)?;
    if parts.next().is_some() {
        return Err(CryptoError::Malformed);
    }

    let iv = hex::decode(iv_hex).map_err(|_| CryptoError::Malformed)?;
    let mut sealed = hex::decode(ciphertext_hex).map_err(|_| CryptoError::Malformed)?;
    let tag = hex::decode(tag_hex).map_err(|_| CryptoError::Malformed)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(CryptoError::Malformed);
    }

    sealed.extend_from_slice(&tag);
    cipher
        .decrypt(GenericArray::from_slice(&iv), sealed.as_slice())
        .map_err(|_| CryptoError::TagMismatch)
}

fn new_cipher(key: &[u8]) -> Result<Aes256Gcm16, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::KeyLength(key.len()));
    }
    Aes256Gcm16::new_from_slice(key).map_err(|_| CryptoError::KeyLength(key.len()))
}

fn derive_iv(plaintext: &[u8], key: &[u8]) -> [u8; IV_LEN] {
    let mut hasher = Md5::new();
    hasher.update(plaintext);
    hasher.update(key);
    hasher.finalize().into()
}
