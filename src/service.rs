use std::sync::Arc;

use crate::config::ReviewConfig;
use crate::errors::WorkflowResult;
use crate::external::{
    Clock, ContentHasher, LogNotifier, NotificationSender, SecureTokenGenerator, Sha256Hasher,
    SystemClock, TokenGenerator,
};
use crate::invitations::{InvitationLedger, InvitationView};
use crate::membership::{LeaveOutcome, MembershipLifecycle};
use crate::model::{PackageId, ProjectId, ReportDecision, ReportId, Role, UserId};
use crate::packages::{PackageApprovalEngine, PackageView};
use crate::reports::{ReportApprovalEngine, ReportApprovalView};
use crate::repository::Repositories;

/// Collaborators injected into every engine
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<dyn TokenGenerator>,
    pub hasher: Arc<dyn ContentHasher>,
    pub notifier: Arc<dyn NotificationSender>,
}

impl Collaborators {
    /// System clock, OS entropy, SHA-256 and a notifier that logs instead of mailing
    pub fn production(config: &ReviewConfig) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            tokens: Arc::new(SecureTokenGenerator),
            hasher: Arc::new(Sha256Hasher),
            notifier: Arc::new(LogNotifier::new(config.notifications.from_address.clone())),
        }
    }
}

/// Entry point for the transport boundary: one method per operation, each
/// returning the caller-facing view.
pub struct ReviewService {
    invitations: InvitationLedger,
    packages: PackageApprovalEngine,
    reports: ReportApprovalEngine,
    membership: MembershipLifecycle,
}

impl ReviewService {
    pub fn new(repos: Repositories, collaborators: Collaborators, config: &ReviewConfig) -> Self {
        Self {
            invitations: InvitationLedger::new(
                repos.clone(),
                collaborators.clock.clone(),
                collaborators.tokens,
                collaborators.notifier.clone(),
                &config.invitations,
                &config.notifications,
            ),
            packages: PackageApprovalEngine::new(
                repos.clone(),
                collaborators.clock.clone(),
                collaborators.notifier,
                &config.notifications,
            ),
            reports: ReportApprovalEngine::new(
                repos.clone(),
                collaborators.clock,
                collaborators.hasher,
            ),
            membership: MembershipLifecycle::new(repos),
        }
    }

    pub async fn invite(
        &self,
        project_id: &ProjectId,
        actor_id: &UserId,
        email: &str,
        role: Role,
        resend_if_pending: bool,
    ) -> WorkflowResult<InvitationView> {
        let outcome = self
            .invitations
            .create_or_resend_invite(project_id, email, role, actor_id, resend_if_pending)
            .await?;
        Ok(InvitationView::from(&outcome.invitation))
    }

    pub async fn invitation_history(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> WorkflowResult<Vec<InvitationView>> {
        self.invitations.history(project_id, email).await
    }

    pub async fn expire_invitations(&self) -> WorkflowResult<u64> {
        self.invitations.expire_stale_invitations().await
    }

    pub async fn leave(
        &self,
        project_id: &ProjectId,
        actor_id: &UserId,
    ) -> WorkflowResult<LeaveOutcome> {
        self.membership.leave(project_id, actor_id).await
    }

    pub async fn start_testing(
        &self,
        project_id: &ProjectId,
        package_id: &PackageId,
        actor_id: &UserId,
    ) -> WorkflowResult<PackageView> {
        self.packages.start_testing(package_id, project_id, actor_id).await
    }

    pub async fn approve_package(
        &self,
        project_id: &ProjectId,
        package_id: &PackageId,
        actor_id: &UserId,
    ) -> WorkflowResult<PackageView> {
        self.packages.approve(package_id, project_id, actor_id).await
    }

    pub async fn reject_package(
        &self,
        project_id: &ProjectId,
        package_id: &PackageId,
        actor_id: &UserId,
        rejection_reason: &str,
    ) -> WorkflowResult<PackageView> {
        self.packages
            .reject(package_id, project_id, actor_id, rejection_reason)
            .await
    }

    pub async fn send_package_to_test(
        &self,
        project_id: &ProjectId,
        package_id: &PackageId,
        actor_id: &UserId,
    ) -> WorkflowResult<PackageView> {
        self.packages
            .send_back_to_test(package_id, project_id, actor_id)
            .await
    }

    pub async fn approve_report(
        &self,
        report_id: &ReportId,
        actor_id: &UserId,
        comment: Option<&str>,
    ) -> WorkflowResult<ReportApprovalView> {
        self.reports
            .decide(report_id, actor_id, ReportDecision::Approve, comment)
            .await
    }

    pub async fn reject_report(
        &self,
        report_id: &ReportId,
        actor_id: &UserId,
        comment: Option<&str>,
    ) -> WorkflowResult<ReportApprovalView> {
        self.reports
            .decide(report_id, actor_id, ReportDecision::Reject, comment)
            .await
    }
}
