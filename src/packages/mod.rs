//! Package approval engine
//!
//! State machine over [`PackageStatus`]:
//!
//! ```text
//! CREATED --start_testing--> EM_TESTE --reject--> REPROVADO
//!                               ^                     |
//!                               +---send_back_to_test-+
//! CREATED | EM_TESTE | REPROVADO --approve--> APROVADO
//! ```
//!
//! Every transition is written with compare-and-set against the status it was
//! validated from. A writer that loses the race re-reads once and re-validates,
//! so it reports the state the winner left behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::config::NotificationConfig;
use crate::errors::{StoreError, WorkflowError, WorkflowResult};
use crate::external::{templates, Clock, NotificationSender};
use crate::model::{
    Membership, PackageId, PackageStatus, Project, ProjectId, ScenarioStatus, TestPackage,
    TestScenario, UserId,
};
use crate::permissions::{can_approve_package, require};
use crate::repository::Repositories;
use crate::telemetry::{create_operation_span, generate_correlation_id};

/// A package together with its scenarios, as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageView {
    #[serde(flatten)]
    pub package: TestPackage,
    pub scenarios: Vec<TestScenario>,
}

/// Everything a transition is validated against
struct PackageContext {
    project: Project,
    package: TestPackage,
    scenarios: Vec<TestScenario>,
    membership: Option<Membership>,
}

impl PackageContext {
    fn is_owner(&self, user_id: &UserId) -> bool {
        self.project.is_owner(user_id)
    }

    fn may_approve(&self, user_id: &UserId) -> bool {
        can_approve_package(self.membership.as_ref().map(|m| m.role), self.is_owner(user_id))
    }

    fn is_member(&self, user_id: &UserId) -> bool {
        self.membership.is_some() || self.is_owner(user_id)
    }
}

pub struct PackageApprovalEngine {
    repos: Repositories,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSender>,
    subject_prefix: String,
}

impl PackageApprovalEngine {
    pub fn new(
        repos: Repositories,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSender>,
        notifications: &NotificationConfig,
    ) -> Self {
        Self {
            repos,
            clock,
            notifier,
            subject_prefix: notifications.subject_prefix.clone(),
        }
    }

    /// Sign the package off. Every scenario must already be APPROVED.
    pub async fn approve(
        &self,
        package_id: &PackageId,
        project_id: &ProjectId,
        approver_id: &UserId,
    ) -> WorkflowResult<PackageView> {
        let now = self.clock.now();
        let (view, _) = self
            .transition("approve_package", package_id, project_id, approver_id, |ctx| {
                require(
                    ctx.may_approve(approver_id),
                    "only the project owner or a manager may approve packages",
                )?;
                if ctx.scenarios.is_empty() {
                    return Err(WorkflowError::invalid_state("no scenarios to approve"));
                }
                let pending = ctx
                    .scenarios
                    .iter()
                    .filter(|s| s.status != ScenarioStatus::Approved)
                    .count();
                if pending > 0 {
                    return Err(WorkflowError::invalid_state(format!(
                        "{pending} of {} scenarios are not APPROVED",
                        ctx.scenarios.len()
                    )));
                }
                match ctx.package.status {
                    PackageStatus::Approved => {
                        Err(WorkflowError::invalid_state("package is already APROVADO"))
                    }
                    PackageStatus::Created | PackageStatus::InTesting | PackageStatus::Rejected => {
                        let mut package = ctx.package.clone();
                        package.mark_approved(approver_id.clone(), now);
                        Ok(package)
                    }
                }
            })
            .await?;
        Ok(view)
    }

    /// Reject a package that is in testing. Testers are notified afterwards;
    /// a failed notification never undoes the rejection.
    pub async fn reject(
        &self,
        package_id: &PackageId,
        project_id: &ProjectId,
        rejector_id: &UserId,
        reason: &str,
    ) -> WorkflowResult<PackageView> {
        let now = self.clock.now();
        let reason = reason.trim();
        let (view, ctx) = self
            .transition("reject_package", package_id, project_id, rejector_id, |ctx| {
                require(
                    ctx.may_approve(rejector_id),
                    "only the project owner or a manager may reject packages",
                )?;
                match ctx.package.status {
                    PackageStatus::InTesting => {}
                    status @ (PackageStatus::Created
                    | PackageStatus::Approved
                    | PackageStatus::Rejected) => {
                        return Err(WorkflowError::invalid_state(format!(
                            "only packages in EM_TESTE can be rejected (current: {status})"
                        )));
                    }
                }
                if reason.is_empty() {
                    return Err(WorkflowError::invalid_state("a rejection reason is required"));
                }
                let mut package = ctx.package.clone();
                package.mark_rejected(rejector_id.clone(), now, reason.to_string());
                Ok(package)
            })
            .await?;

        self.notify_testers(&view.package, &ctx.scenarios, reason).await;
        Ok(view)
    }

    /// Put a rejected package back into testing. Rejection history stays.
    pub async fn send_back_to_test(
        &self,
        package_id: &PackageId,
        project_id: &ProjectId,
        actor_id: &UserId,
    ) -> WorkflowResult<PackageView> {
        let (view, _) = self
            .transition("send_back_to_test", package_id, project_id, actor_id, |ctx| {
                require(ctx.is_member(actor_id), "only project members may resubmit packages")?;
                match ctx.package.status {
                    PackageStatus::Rejected => {
                        let mut package = ctx.package.clone();
                        package.mark_back_in_testing();
                        Ok(package)
                    }
                    status @ (PackageStatus::Created
                    | PackageStatus::InTesting
                    | PackageStatus::Approved) => Err(WorkflowError::invalid_state(format!(
                        "only REPROVADO packages can be sent back to test (current: {status})"
                    ))),
                }
            })
            .await?;
        Ok(view)
    }

    /// Open the first testing round of a freshly created package
    pub async fn start_testing(
        &self,
        package_id: &PackageId,
        project_id: &ProjectId,
        actor_id: &UserId,
    ) -> WorkflowResult<PackageView> {
        let (view, _) = self
            .transition("start_testing", package_id, project_id, actor_id, |ctx| {
                require(ctx.is_member(actor_id), "only project members may start testing")?;
                match ctx.package.status {
                    PackageStatus::Created => {
                        let mut package = ctx.package.clone();
                        package.status = PackageStatus::InTesting;
                        Ok(package)
                    }
                    status @ (PackageStatus::InTesting
                    | PackageStatus::Approved
                    | PackageStatus::Rejected) => Err(WorkflowError::invalid_state(format!(
                        "only CREATED packages can start testing (current: {status})"
                    ))),
                }
            })
            .await?;
        Ok(view)
    }

    async fn load(
        &self,
        package_id: &PackageId,
        project_id: &ProjectId,
        actor_id: &UserId,
    ) -> WorkflowResult<PackageContext> {
        let missing = || {
            WorkflowError::not_found(format!(
                "package {package_id} not found in project {project_id}"
            ))
        };

        let package = self
            .repos
            .packages
            .find_package(package_id, project_id)
            .await?
            .ok_or_else(missing)?;
        let project = self
            .repos
            .projects
            .find_project(project_id)
            .await?
            .ok_or_else(missing)?;
        let scenarios = self.repos.scenarios.list_for_package(package_id).await?;
        let membership = self
            .repos
            .memberships
            .find_membership(actor_id, project_id)
            .await?;

        Ok(PackageContext {
            project,
            package,
            scenarios,
            membership,
        })
    }

    /// Load, validate with `decide`, then compare-and-set. A lost race is
    /// retried once against fresh state.
    async fn transition<F>(
        &self,
        operation: &str,
        package_id: &PackageId,
        project_id: &ProjectId,
        actor_id: &UserId,
        decide: F,
    ) -> WorkflowResult<(PackageView, PackageContext)>
    where
        F: Fn(&PackageContext) -> WorkflowResult<TestPackage>,
    {
        let correlation_id = generate_correlation_id();
        let span = create_operation_span(
            operation,
            Some(actor_id.as_str()),
            Some(package_id.as_str()),
            Some(&correlation_id),
        );

        async {
            let mut retried = false;
            loop {
                let ctx = self.load(package_id, project_id, actor_id).await?;
                let updated = decide(&ctx)?;
                let expected = ctx.package.status;

                match self
                    .repos
                    .packages
                    .save_transition(updated.clone(), expected)
                    .await
                {
                    Ok(()) => {
                        info!(from = %expected, to = %updated.status, "Package transitioned");
                        let view = PackageView {
                            package: updated,
                            scenarios: ctx.scenarios.clone(),
                        };
                        return Ok((view, ctx));
                    }
                    Err(StoreError::StaleState { entity }) if !retried => {
                        debug!(%entity, "Package changed concurrently, re-validating");
                        retried = true;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn notify_testers(&self, package: &TestPackage, scenarios: &[TestScenario], reason: &str) {
        let tester_ids: BTreeSet<&UserId> = package
            .assignee_id
            .iter()
            .chain(scenarios.iter().filter_map(|s| s.tester_id.as_ref()))
            .collect();

        let mut addresses = BTreeSet::new();
        for tester_id in tester_ids {
            match self.repos.users.find_user(tester_id).await {
                Ok(Some(user)) => {
                    addresses.insert(user.email);
                }
                Ok(None) => warn!(user.id = %tester_id, "Tester not found, skipping notification"),
                Err(err) => warn!(user.id = %tester_id, error = %err, "Tester lookup failed"),
            }
        }

        let notification = templates::package_rejected(&self.subject_prefix, package, reason);
        for address in &addresses {
            if let Err(err) = self
                .notifier
                .send(address, &notification.subject, &notification.body)
                .await
            {
                warn!(package.id = %package.id, error = %err, "Rejection notification failed");
            }
        }
    }
}
