//! Domain model for the review workflow
//!
//! Plain data types shared by every engine. State lives in the repository layer;
//! nothing here talks to storage or the outside world.

pub mod email;
pub mod ids;
pub mod invitation;
pub mod package;
pub mod project;
pub mod report;
pub mod role;

pub use email::{is_plausible_email, normalize_email};
pub use ids::{ApprovalId, InvitationId, PackageId, ProjectId, ReportId, ScenarioId, UserId};
pub use invitation::{Invitation, InvitationStatus};
pub use package::{PackageStatus, ScenarioStatus, TestPackage, TestScenario};
pub use project::{Membership, Project, User};
pub use report::{ApprovalStatus, ReportApproval, ReportDecision, ReportParent, TestReport};
pub use role::Role;

/// Error returned when a persisted status or role string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value `{value}`")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
