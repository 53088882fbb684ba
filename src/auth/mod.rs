//! Login, lockout, and authorization.
//!
//! ## Lockout
//!
//! Each principal gets three attempts. A failed attempt decrements the counter
//! and moves `locked_until` forward by `max(|retries| * 3, 5)` minutes; once the
//! counter reaches zero the account is locked until that moment. A successful
//! login restores the counter.
//!
//! ## Authorization
//!
//! Routes declare a [`RoleSet`] at registration. The [`AccessController`]
//! grants when the caller owns the target record (if `owner` is required) or
//! when the caller's stored role is in the set. Roles are resolved through a
//! [`PrincipalDirectory`], implemented both by every [`UserRepository`] and by
//! the [`UserService`].

pub mod access;
pub mod config;
pub mod error;
pub mod login;
pub mod principal;
pub mod repo;
pub mod storage;
pub mod users;
pub mod utils;

pub use access::{AccessController, AccessGrant, CallContext, GrantBasis, PrincipalDirectory};
pub use config::AuthConfig;
pub use error::AuthError;
pub use login::LoginGuard;
pub use principal::{Principal, PrincipalStatus, PrincipalView, Requirement, Role, RoleSet};
pub use repo::{InMemoryUserRepository, RepositoryError, UserRepository, UserUpdate};
pub use storage::PgUserRepository;
pub use users::{NewUser, UserChanges, UserLookup, UserService};
