// QA Review Library - invitation and approval workflows for test-management projects
// Exposes the engines, the repository seams and the ambient config/telemetry setup

pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod errors;
pub mod external;
pub mod invitations;
pub mod membership;
pub mod model;
pub mod packages;
pub mod permissions;
pub mod reports;
pub mod repository;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod testing;

// Re-export key types for easy access
pub use config::{config, ReviewConfig};
#[cfg(feature = "database")]
pub use database::{init_database, shutdown_database};
pub use errors::{ErrorBody, ErrorKind, StoreError, WorkflowError, WorkflowResult};
pub use invitations::{InvitationLedger, InvitationView, InviteDelivery, InviteOutcome};
pub use membership::{LeaveOutcome, MembershipLifecycle};
pub use packages::{PackageApprovalEngine, PackageView};
pub use reports::{ReportApprovalEngine, ReportApprovalView};
pub use repository::{InMemoryStore, Repositories};
pub use service::{Collaborators, ReviewService};
pub use telemetry::{create_operation_span, generate_correlation_id, init_telemetry};
