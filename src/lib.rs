//! # Custos (credential and access-control core)
//!
//! `custos` issues and verifies stateless session tokens, stores passwords
//! through a layered hashing pipeline, locks accounts after repeated failed
//! logins, and decides role and ownership based access for protected routes.
//!
//! ## Building blocks
//!
//! - [`cipher`]: AES-256-GCM with a 16-byte IV, encoded as `iv:ciphertext:tag`
//!   in lower-case hex.
//! - [`password`]: PBKDF2-SHA256, a character blend, deterministic encryption
//!   and bcrypt, plus the password strength policy.
//! - [`token`]: JSON claims with an `expire` timestamp, encrypted with the
//!   cipher.
//! - [`auth`]: login with progressive lockout, the access controller, the user
//!   service and the user repositories (in-memory and PostgreSQL).
//! - [`catalog`]: products, the second resource guarded by role sets.
//! - [`api`]: the `axum` router. Every protected route group declares the
//!   roles it admits when it is registered.
//! - [`cli`]: argument parsing, telemetry and server startup.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod cipher;
pub mod cli;
pub mod password;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
