//! Principal records, roles, and the role sets routes are guarded with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::error::AuthError;

/// Login attempts a principal gets before being locked.
pub const MAX_RETRIES: i32 = 3;

/// Stored role of a principal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Reader,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "reader" => Ok(Self::Reader),
            other => Err(AuthError::InvalidProperty(format!(
                "'{other}' is not a valid role."
            ))),
        }
    }
}

/// One entry of a route's access requirement. `Owner` is satisfied by
/// matching the target record, not by a stored role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Requirement {
    Admin,
    User,
    Reader,
    Owner,
}

impl From<Role> for Requirement {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => Self::Admin,
            Role::User => Self::User,
            Role::Reader => Self::Reader,
        }
    }
}

impl FromStr for Requirement {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("owner") {
            return Ok(Self::Owner);
        }
        value.parse::<Role>().map(Self::from)
    }
}

/// Deduplicated, non-empty set of requirements; any one of them grants access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleSet(BTreeSet<Requirement>);

impl RoleSet {
    /// # Errors
    /// Returns [`AuthError::InvalidProperty`] if `requirements` is empty.
    pub fn new(requirements: impl IntoIterator<Item = Requirement>) -> Result<Self, AuthError> {
        let set: BTreeSet<Requirement> = requirements.into_iter().collect();
        if set.is_empty() {
            return Err(AuthError::InvalidProperty(
                "at least one required role must be configured".to_string(),
            ));
        }
        Ok(Self(set))
    }

    /// Every stored role; used for routes any authenticated principal may call.
    #[must_use]
    pub fn any_role() -> Self {
        Self([Requirement::Admin, Requirement::User, Requirement::Reader].into())
    }

    #[must_use]
    pub fn requires_owner(&self) -> bool {
        self.0.contains(&Requirement::Owner)
    }

    #[must_use]
    pub fn owner_only(&self) -> bool {
        self.requires_owner() && self.0.len() == 1
    }

    #[must_use]
    pub fn admits(&self, role: Role) -> bool {
        self.0.contains(&Requirement::from(role))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .0
            .iter()
            .map(|requirement| match requirement {
                Requirement::Admin => "admin",
                Requirement::User => "user",
                Requirement::Reader => "reader",
                Requirement::Owner => "owner",
            })
            .collect();
        f.write_str(&names.join(", "))
    }
}

/// An account record as the repository stores it.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password_hash: String,
    pub salt: String,
    pub role: Role,
    pub retries: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("retries", &self.retries)
            .field("locked_until", &self.locked_until)
            .finish_non_exhaustive()
    }
}

impl Principal {
    /// Locked while the retry budget is spent and the lock window is open.
    #[must_use]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.retries < 1 && self.locked_until.is_some_and(|until| now < until)
    }

    #[must_use]
    pub fn status(&self) -> PrincipalStatus {
        if self.retries > 0 {
            PrincipalStatus::Active
        } else {
            PrincipalStatus::Locked
        }
    }

    #[must_use]
    pub fn view(&self) -> PrincipalView {
        PrincipalView::from(self)
    }
}

/// Fields for a principal that does not exist yet.
#[derive(Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password_hash: String,
    pub salt: String,
    pub role: Role,
    pub retries: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalStatus {
    Active,
    Locked,
}

/// Public view of a principal. Never carries the password hash or salt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrincipalView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub role: Role,
    pub retries: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub status: PrincipalStatus,
}

impl From<&Principal> for PrincipalView {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.id,
            username: principal.username.clone(),
            email: principal.email.clone(),
            fullname: principal.fullname.clone(),
            role: principal.role,
            retries: principal.retries,
            locked_until: principal.locked_until,
            status: principal.status(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample(id: i64, username: &str, role: Role) -> Principal {
    Principal {
        id,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        fullname: username.to_string(),
        password_hash: String::new(),
        salt: String::new(),
        role,
        retries: MAX_RETRIES,
        locked_until: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn role_set_deduplicates_and_rejects_empty() {
        let set = RoleSet::new([Requirement::Admin, Requirement::Admin, Requirement::Owner]);
        assert!(set.is_ok());
        if let Ok(set) = set {
            assert_eq!(set.len(), 2);
            assert!(set.requires_owner());
            assert!(!set.owner_only());
            assert!(set.admits(Role::Admin));
            assert!(!set.admits(Role::Reader));
            assert_eq!(set.to_string(), "admin, owner");
        }
        assert!(RoleSet::new(Vec::<Requirement>::new()).is_err());
    }

    #[test]
    fn owner_only_set() {
        let set = RoleSet::new([Requirement::Owner, Requirement::Owner]);
        assert!(set.is_ok_and(|set| set.owner_only()));
    }

    #[test]
    fn requirement_parsing() {
        assert_eq!("Owner".parse::<Requirement>().ok(), Some(Requirement::Owner));
        assert_eq!("reader".parse::<Requirement>().ok(), Some(Requirement::Reader));
        assert!("root".parse::<Requirement>().is_err());
        assert!(matches!(
            "root".parse::<Role>(),
            Err(AuthError::InvalidProperty(_))
        ));
    }

    #[test]
    fn lock_state_follows_clock() {
        let now = Utc::now();
        let mut principal = sample(1, "admin", Role::Admin);
        assert!(!principal.is_locked_at(now));

        principal.retries = 0;
        principal.locked_until = Some(now + Duration::minutes(5));
        assert!(principal.is_locked_at(now));
        assert!(!principal.is_locked_at(now + Duration::minutes(6)));
        assert_eq!(principal.status(), PrincipalStatus::Locked);

        // Retries left means active, whatever the timestamp says.
        principal.retries = 1;
        assert!(!principal.is_locked_at(now));
        assert_eq!(principal.status(), PrincipalStatus::Active);
    }

    #[test]
    fn view_masks_secrets() -> Result<(), serde_json::Error> {
        let mut principal = sample(3, "janedoe", Role::Reader);
        principal.password_hash = "$2b$12$secret".to_string();
        principal.salt = "0123456789abcdef".to_string();

        let json = serde_json::to_string(&principal.view())?;
        assert!(!json.contains("secret"));
        assert!(!json.contains("0123456789abcdef"));
        assert!(json.contains(r#""role":"reader""#));
        assert!(json.contains(r#""status":"active""#));
        Ok(())
    }
}
