use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{Id, ParkingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// The authenticated principal on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: Id,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: Id) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn admin(user_id: Id) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ParkingError> {
        if !self.is_admin() {
            return Err(ParkingError::Forbidden(format!(
                "user {} is not an administrator",
                self.user_id
            )));
        }
        Ok(())
    }

    /// Passes for the owner itself or any admin.
    pub fn require_owner_or_admin(&self, owner_id: Id) -> Result<(), ParkingError> {
        if self.is_admin() || self.user_id == owner_id {
            return Ok(());
        }
        Err(ParkingError::Forbidden(format!(
            "user {} does not own this resource",
            self.user_id
        )))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ParkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ParkingError::Validation(format!("unknown role: {}", other))),
        }
    }
}
