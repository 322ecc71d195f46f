//! Users and technicians.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChatId, RoleSet, TechnicianId, UserId};

/// Principal known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// External principal id (immutable).
    pub id: UserId,
    /// Optional handle on the chat platform.
    pub username: Option<String>,
    /// Optional human-readable name.
    pub display_name: Option<String>,
    /// Normalised role tags.
    pub roles: RoleSet,
    /// Soft-deletion marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// CAS version, bumped on every mutation.
    pub version: i64,
}

impl User {
    /// Whether the user has been tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Label suitable for notifications.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("#{}", self.id))
    }
}

/// Field technician bound one-to-one to a MASTER user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    pub user_id: UserId,
    pub phone: Option<String>,
    /// Free-form specialty description.
    pub specialty: Option<String>,
    pub is_active: bool,
    pub is_approved: bool,
    /// Private conversation used to reach the technician.
    pub work_chat_id: Option<ChatId>,
}

/// Why a technician cannot take an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Inactive,
    NotApproved,
    NoWorkChannel,
    MissingMasterRole,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Inactive => "technician is not active",
            Self::NotApproved => "technician is not approved",
            Self::NoWorkChannel => "technician has no work channel",
            Self::MissingMasterRole => "technician user does not hold MASTER",
        };
        f.write_str(text)
    }
}

impl Technician {
    /// Check whether the technician may receive assignments.
    ///
    /// # Examples
    /// ```
    /// use dispatch_backend::domain::{ChatId, Technician, TechnicianId, UnavailableReason, UserId};
    ///
    /// let mut technician = Technician {
    ///     id: TechnicianId::new(1),
    ///     user_id: UserId::new(10),
    ///     phone: None,
    ///     specialty: None,
    ///     is_active: true,
    ///     is_approved: true,
    ///     work_chat_id: Some(ChatId::new(-100)),
    /// };
    /// assert!(technician.check_assignable().is_ok());
    /// technician.work_chat_id = None;
    /// assert_eq!(technician.check_assignable(), Err(UnavailableReason::NoWorkChannel));
    /// ```
    pub fn check_assignable(&self) -> Result<ChatId, UnavailableReason> {
        if !self.is_active {
            return Err(UnavailableReason::Inactive);
        }
        if !self.is_approved {
            return Err(UnavailableReason::NotApproved);
        }
        self.work_chat_id.ok_or(UnavailableReason::NoWorkChannel)
    }
}

/// A technician together with the roles of its user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechnicianProfile {
    pub technician: Technician,
    pub roles: RoleSet,
}
