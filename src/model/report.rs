use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ApprovalId, PackageId, ParseEnumError, ReportId, ScenarioId, UserId};

/// What a report hangs off. A report has at most one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportParent {
    Scenario { scenario_id: ScenarioId },
    Package { package_id: PackageId },
    /// Cannot be decided: there is no project to authorise against
    Orphan,
}

impl ReportParent {
    pub fn from_columns(scenario_id: Option<ScenarioId>, package_id: Option<PackageId>) -> Self {
        match (scenario_id, package_id) {
            (Some(scenario_id), _) => ReportParent::Scenario { scenario_id },
            (None, Some(package_id)) => ReportParent::Package { package_id },
            (None, None) => ReportParent::Orphan,
        }
    }

    pub fn scenario_id(&self) -> Option<&ScenarioId> {
        match self {
            ReportParent::Scenario { scenario_id } => Some(scenario_id),
            ReportParent::Package { .. } | ReportParent::Orphan => None,
        }
    }

    pub fn package_id(&self) -> Option<&PackageId> {
        match self {
            ReportParent::Package { package_id } => Some(package_id),
            ReportParent::Scenario { .. } | ReportParent::Orphan => None,
        }
    }
}

/// Generated evidence artifact. Content is immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub id: ReportId,
    pub parent: ReportParent,
    #[serde(skip_serializing, default)]
    pub content: Vec<u8>,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Requested outcome of a report decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportDecision {
    Approve,
    Reject,
}

impl ReportDecision {
    pub fn resulting_status(&self) -> ApprovalStatus {
        match self {
            ReportDecision::Approve => ApprovalStatus::Approved,
            ReportDecision::Reject => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            _ => Err(ParseEnumError::new("approval status", s)),
        }
    }
}

/// The single, final decision on a report. There is no re-decide path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportApproval {
    pub id: ApprovalId,
    pub report_id: ReportId,
    pub status: ApprovalStatus,
    pub comment: String,
    pub approved_by: UserId,
    /// Digest of the report bytes at decision time
    pub file_hash: String,
    pub approved_at: DateTime<Utc>,
}
