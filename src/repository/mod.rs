//! Persistence seams
//!
//! One trait per entity, exposing only the lookups and writes the engines
//! need. Implementations must enforce the storage-level guarantees documented
//! on each method; the engines rely on them to close check-then-act races.
//!
//! ```rust
//! use qa_review::repository::{InMemoryStore, Repositories};
//! use std::sync::Arc;
//!
//! let repos = Repositories::from_store(Arc::new(InMemoryStore::new()));
//! # let _ = repos;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::errors::StoreError;
use crate::model::{
    Invitation, Membership, PackageId, PackageStatus, Project, ProjectId, ReportApproval,
    ReportId, ScenarioId, ScenarioStatus, TestPackage, TestReport, TestScenario, User, UserId,
};

#[cfg(test)]
use mockall::automock;

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_project(&self, id: &ProjectId) -> StoreResult<Option<Project>>;

    async fn insert_project(&self, project: Project) -> StoreResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: &UserId) -> StoreResult<Option<User>>;

    /// `email` must already be normalized
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn insert_user(&self, user: User) -> StoreResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find_membership(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<Membership>>;

    /// Fails with `Duplicate` if (user, project) already has a membership
    async fn insert_membership(&self, membership: Membership) -> StoreResult<()>;

    /// Removes and returns the membership, if any
    async fn delete_membership(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<Membership>>;
}

/// Which PENDING rows an expiry sweep may touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryScope {
    pub project_id: Option<ProjectId>,
    pub email: Option<String>,
}

impl ExpiryScope {
    pub fn everywhere() -> Self {
        Self::default()
    }

    pub fn key(project_id: &ProjectId, email: &str) -> Self {
        Self {
            project_id: Some(project_id.clone()),
            email: Some(email.to_string()),
        }
    }

    pub fn matches(&self, invitation: &Invitation) -> bool {
        self.project_id
            .as_ref()
            .is_none_or(|p| p == &invitation.project_id)
            && self.email.as_ref().is_none_or(|e| e == &invitation.email)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait InviteRepository: Send + Sync {
    /// The PENDING, not-yet-expired invitation for (project, email), if any
    async fn find_pending(
        &self,
        project_id: &ProjectId,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Invitation>>;

    /// Fails with `Duplicate` if a PENDING row already exists for the same
    /// (project, email), expired or not. Stale rows must be archived with
    /// [`InviteRepository::expire_stale`] first.
    async fn insert_invitation(&self, invitation: Invitation) -> StoreResult<()>;

    /// Persist EXPIRED on PENDING rows with `expires_at <= now` inside
    /// `scope`. Returns the number of rows archived.
    async fn expire_stale(&self, scope: ExpiryScope, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Every invitation ever issued for (project, email), oldest first
    async fn list_invitations(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> StoreResult<Vec<Invitation>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    async fn find_scenario(&self, id: &ScenarioId) -> StoreResult<Option<TestScenario>>;

    async fn list_for_package(&self, package_id: &PackageId) -> StoreResult<Vec<TestScenario>>;

    async fn insert_scenario(&self, scenario: TestScenario) -> StoreResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Looks the package up scoped to its project
    async fn find_package(
        &self,
        id: &PackageId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<TestPackage>>;

    /// Unscoped lookup, used to resolve a package-linked report's project
    async fn find_package_by_id(&self, id: &PackageId) -> StoreResult<Option<TestPackage>>;

    /// Compare-and-set: writes `package` only if the stored status still
    /// equals `expected`, otherwise fails with `StaleState`.
    ///
    /// A write that lands the package in APROVADO also requires, atomically
    /// with the write, that the package has scenarios and every one of them is
    /// APPROVED. A scenario decided in the meantime yields `StaleState`.
    async fn save_transition(
        &self,
        package: TestPackage,
        expected: PackageStatus,
    ) -> StoreResult<()>;

    async fn insert_package(&self, package: TestPackage) -> StoreResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn find_report(&self, id: &ReportId) -> StoreResult<Option<TestReport>>;

    async fn insert_report(&self, report: TestReport) -> StoreResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportApprovalRepository: Send + Sync {
    async fn find_for_report(&self, report_id: &ReportId) -> StoreResult<Option<ReportApproval>>;

    /// Persists the decision and, when given, the linked scenario's new
    /// status as one unit: either both writes land or neither does.
    /// Fails with `Duplicate` if the report already has a decision.
    async fn record_decision(
        &self,
        approval: ReportApproval,
        scenario: Option<(ScenarioId, ScenarioStatus)>,
    ) -> StoreResult<()>;
}

/// Explicitly constructed repository set, handed to every engine
#[derive(Clone)]
pub struct Repositories {
    pub projects: Arc<dyn ProjectRepository>,
    pub users: Arc<dyn UserRepository>,
    pub memberships: Arc<dyn MembershipRepository>,
    pub invites: Arc<dyn InviteRepository>,
    pub scenarios: Arc<dyn ScenarioRepository>,
    pub packages: Arc<dyn PackageRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub approvals: Arc<dyn ReportApprovalRepository>,
}

impl Repositories {
    /// Back every repository with the same store
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ProjectRepository
            + UserRepository
            + MembershipRepository
            + InviteRepository
            + ScenarioRepository
            + PackageRepository
            + ReportRepository
            + ReportApprovalRepository
            + 'static,
    {
        Self {
            projects: store.clone(),
            users: store.clone(),
            memberships: store.clone(),
            invites: store.clone(),
            scenarios: store.clone(),
            packages: store.clone(),
            reports: store.clone(),
            approvals: store,
        }
    }
}
