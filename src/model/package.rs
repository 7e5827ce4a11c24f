use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{PackageId, ParseEnumError, ProjectId, ScenarioId, UserId};

/// Lifecycle of a single test scenario. Owned by the scenario lifecycle; the
/// review engines only ever write `Approved` / `Reproved` into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Created,
    Executed,
    Passed,
    Failed,
    Approved,
    Reproved,
    Blocked,
    Pending,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Created => "CREATED",
            ScenarioStatus::Executed => "EXECUTED",
            ScenarioStatus::Passed => "PASSED",
            ScenarioStatus::Failed => "FAILED",
            ScenarioStatus::Approved => "APPROVED",
            ScenarioStatus::Reproved => "REPROVED",
            ScenarioStatus::Blocked => "BLOCKED",
            ScenarioStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ScenarioStatus::Created),
            "EXECUTED" => Ok(ScenarioStatus::Executed),
            "PASSED" => Ok(ScenarioStatus::Passed),
            "FAILED" => Ok(ScenarioStatus::Failed),
            "APPROVED" => Ok(ScenarioStatus::Approved),
            "REPROVED" => Ok(ScenarioStatus::Reproved),
            "BLOCKED" => Ok(ScenarioStatus::Blocked),
            "PENDING" => Ok(ScenarioStatus::Pending),
            _ => Err(ParseEnumError::new("scenario status", s)),
        }
    }
}

/// Review status of a test package.
///
/// `Created` and `InTesting` are working states. `Approved` and `Rejected`
/// are decisions that stay mutable: a rejected package can go back to
/// testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageStatus {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "EM_TESTE")]
    InTesting,
    #[serde(rename = "APROVADO")]
    Approved,
    #[serde(rename = "REPROVADO")]
    Rejected,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Created => "CREATED",
            PackageStatus::InTesting => "EM_TESTE",
            PackageStatus::Approved => "APROVADO",
            PackageStatus::Rejected => "REPROVADO",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(PackageStatus::Created),
            "EM_TESTE" => Ok(PackageStatus::InTesting),
            "APROVADO" => Ok(PackageStatus::Approved),
            "REPROVADO" => Ok(PackageStatus::Rejected),
            _ => Err(ParseEnumError::new("package status", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestScenario {
    pub id: ScenarioId,
    pub project_id: ProjectId,
    pub package_id: Option<PackageId>,
    pub title: String,
    pub status: ScenarioStatus,
    pub tester_id: Option<UserId>,
    /// The only non-owner identity allowed to decide this scenario's reports
    pub approver_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPackage {
    pub id: PackageId,
    pub project_id: ProjectId,
    pub title: String,
    pub status: PackageStatus,
    /// Package-level tester, notified on rejection alongside scenario testers
    pub assignee_id: Option<UserId>,
    pub approved_by_id: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by_id: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl TestPackage {
    pub fn new(id: PackageId, project_id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            project_id,
            title: title.into(),
            status: PackageStatus::Created,
            assignee_id: None,
            approved_by_id: None,
            approved_at: None,
            rejected_by_id: None,
            rejected_at: None,
            rejection_reason: None,
        }
    }

    /// Stamp the approval and wipe any rejection fields.
    pub fn mark_approved(&mut self, by: UserId, at: DateTime<Utc>) {
        self.status = PackageStatus::Approved;
        self.approved_by_id = Some(by);
        self.approved_at = Some(at);
        self.rejected_by_id = None;
        self.rejected_at = None;
        self.rejection_reason = None;
    }

    /// Stamp the rejection and wipe any approval fields.
    pub fn mark_rejected(&mut self, by: UserId, at: DateTime<Utc>, reason: String) {
        self.status = PackageStatus::Rejected;
        self.rejected_by_id = Some(by);
        self.rejected_at = Some(at);
        self.rejection_reason = Some(reason);
        self.approved_by_id = None;
        self.approved_at = None;
    }

    /// Re-enter testing. Rejection history is kept for audit.
    pub fn mark_back_in_testing(&mut self) {
        self.status = PackageStatus::InTesting;
    }
}
