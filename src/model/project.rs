use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProjectId, Role, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Stored normalized (see [`super::normalize_email`])
    pub email: String,
    pub name: Option<String>,
}

/// A project has exactly one owner and the owner never changes here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner_id: UserId,
}

impl Project {
    pub fn is_owner(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }
}

/// The (user, project, role) binding. At most one per (user, project).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}
