use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Application role stored alongside the identity provider's user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Staff,
    Admin,
}

impl UserRole {
    pub fn parse(value: &str) -> Self {
        match value {
            "admin" => UserRole::Admin,
            "staff" => UserRole::Staff,
            _ => UserRole::User,
        }
    }

    pub fn can_scan(&self) -> bool {
        matches!(self, UserRole::Staff | UserRole::Admin)
    }
}

/// A registered account as returned by the transfer recipient lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
}
