//! Role tags and the normalised role set carried by every user.
//!
//! Roles are a flat set of tags rather than a hierarchy. Persisted form is a
//! comma-separated list in ascending tag order with no duplicates; the
//! `UNKNOWN` tag is present exactly when no other tag is.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Platform administrator.
    Admin,
    /// Creates and routes orders.
    Dispatcher,
    /// Field technician.
    Master,
    /// Technician with the privileged 50/50 split.
    SeniorMaster,
    /// Placeholder for principals without any real role.
    Unknown,
}

impl Role {
    /// Stable storage tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Dispatcher => "DISPATCHER",
            Self::Master => "MASTER",
            Self::SeniorMaster => "SENIOR_MASTER",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Display precedence; lower wins.
    const fn precedence(self) -> u8 {
        match self {
            Self::Admin => 0,
            Self::Dispatcher => 1,
            Self::SeniorMaster => 2,
            Self::Master => 3,
            Self::Unknown => 4,
        }
    }

    /// Whether the role belongs to back-office staff.
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Dispatcher)
    }

    /// Whether the role belongs to field technicians.
    pub const fn is_technician(self) -> bool {
        matches!(self, Self::Master | Self::SeniorMaster)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role tag is not one of the fixed values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role tag `{0}`")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "DISPATCHER" => Ok(Self::Dispatcher),
            "MASTER" => Ok(Self::Master),
            "SENIOR_MASTER" => Ok(Self::SeniorMaster),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(RoleParseError(other.to_owned())),
        }
    }
}

/// Normalised set of role tags.
///
/// ## Invariants
/// - Tags are unique and iterate in ascending storage order.
/// - `UNKNOWN` is present iff no other tag is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Build a normalised set from any collection of tags.
    ///
    /// # Examples
    /// ```
    /// use dispatch_backend::domain::{Role, RoleSet};
    ///
    /// let roles = RoleSet::new([Role::Master, Role::Unknown, Role::Master]);
    /// assert_eq!(roles.to_string(), "MASTER");
    /// assert_eq!(RoleSet::new([]).to_string(), "UNKNOWN");
    /// ```
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut set: BTreeSet<Role> = roles
            .into_iter()
            .filter(|role| *role != Role::Unknown)
            .collect();
        if set.is_empty() {
            set.insert(Role::Unknown);
        }
        Self(set)
    }

    /// The set holding only `UNKNOWN`.
    pub fn unknown() -> Self {
        Self::new([])
    }

    /// Membership test.
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// True when any tag is ADMIN or DISPATCHER.
    pub fn is_staff(&self) -> bool {
        self.0.iter().any(|role| role.is_staff())
    }

    /// True when any tag is MASTER or SENIOR_MASTER.
    pub fn is_technician(&self) -> bool {
        self.0.iter().any(|role| role.is_technician())
    }

    /// Role used for display, by precedence
    /// ADMIN > DISPATCHER > SENIOR_MASTER > MASTER > UNKNOWN.
    pub fn primary_role(&self) -> Role {
        self.0
            .iter()
            .copied()
            .min_by_key(|role| role.precedence())
            .unwrap_or(Role::Unknown)
    }

    /// Tags in storage order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|role| role.as_str())
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

impl FromStr for RoleSet {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roles = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Role::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(roles))
    }
}

impl TryFrom<String> for RoleSet {
    type Error = RoleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoleSet> for String {
    fn from(value: RoleSet) -> Self {
        value.to_string()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("MASTER,ADMIN", "ADMIN,MASTER")]
    #[case("master, master", "MASTER")]
    #[case("", "UNKNOWN")]
    #[case("UNKNOWN,DISPATCHER", "DISPATCHER")]
    #[case("SENIOR_MASTER,MASTER", "MASTER,SENIOR_MASTER")]
    fn role_sets_normalise(#[case] raw: &str, #[case] expected: &str) {
        let roles: RoleSet = raw.parse().expect("valid roles");
        assert_eq!(roles.to_string(), expected);
    }

    #[rstest]
    fn rejects_foreign_tags() {
        let err = "MASTER,OWNER".parse::<RoleSet>().expect_err("unknown tag");
        assert_eq!(err, RoleParseError("OWNER".to_owned()));
    }

    #[rstest]
    #[case(&[Role::Master, Role::SeniorMaster], Role::SeniorMaster)]
    #[case(&[Role::Master, Role::Dispatcher], Role::Dispatcher)]
    #[case(&[Role::Admin, Role::Dispatcher, Role::Master], Role::Admin)]
    #[case(&[], Role::Unknown)]
    fn primary_role_follows_precedence(#[case] roles: &[Role], #[case] expected: Role) {
        let set = RoleSet::new(roles.iter().copied());
        assert_eq!(set.primary_role(), expected);
    }

    #[rstest]
    fn staff_and_technician_classes() {
        let set = RoleSet::new([Role::Dispatcher, Role::Master]);
        assert!(set.is_staff());
        assert!(set.is_technician());
        assert!(!RoleSet::unknown().is_staff());
    }
}
