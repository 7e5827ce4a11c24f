//! Report approval engine
//!
//! A report gets exactly one decision, ever. The pre-check catches the common
//! case; the storage-level uniqueness on `report_id` catches concurrent
//! deciders, and the loser sees the same `InvalidState` as a late caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::errors::{StoreError, WorkflowError, WorkflowResult};
use crate::external::{Clock, ContentHasher};
use crate::model::{
    ApprovalId, ProjectId, ReportApproval, ReportDecision, ReportId, ReportParent, ScenarioId,
    ScenarioStatus, TestScenario, UserId,
};
use crate::permissions::{can_decide_report, require};
use crate::repository::Repositories;
use crate::telemetry::{create_operation_span, generate_correlation_id};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportApprovalView {
    pub approval: ReportApproval,
    /// Set when the decision was propagated to the originating scenario
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<ScenarioId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_status: Option<ScenarioStatus>,
}

pub struct ReportApprovalEngine {
    repos: Repositories,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn ContentHasher>,
}

impl ReportApprovalEngine {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>, hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            repos,
            clock,
            hasher,
        }
    }

    pub async fn decide(
        &self,
        report_id: &ReportId,
        actor_id: &UserId,
        decision: ReportDecision,
        comment: Option<&str>,
    ) -> WorkflowResult<ReportApprovalView> {
        let correlation_id = generate_correlation_id();
        let span = create_operation_span(
            "decide_report",
            Some(actor_id.as_str()),
            Some(report_id.as_str()),
            Some(&correlation_id),
        );

        async {
            let report = self
                .repos
                .reports
                .find_report(report_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found(format!("report {report_id} not found")))?;

            if self.repos.approvals.find_for_report(report_id).await?.is_some() {
                return Err(already_decided());
            }

            let scenario = match report.parent.scenario_id() {
                Some(scenario_id) => self.repos.scenarios.find_scenario(scenario_id).await?,
                None => None,
            };
            let project_id = self.resolve_project(&report.parent, scenario.as_ref()).await?;
            let project = self
                .repos
                .projects
                .find_project(&project_id)
                .await?
                .ok_or_else(no_project)?;

            let is_scenario_approver = scenario
                .as_ref()
                .and_then(|s| s.approver_id.as_ref())
                .is_some_and(|approver| approver == actor_id);
            require(
                can_decide_report(project.is_owner(actor_id), is_scenario_approver),
                "only the project owner or the scenario's approver may decide this report",
            )?;

            let comment = comment.map(str::trim).unwrap_or_default();
            match decision {
                ReportDecision::Reject if comment.is_empty() => {
                    return Err(WorkflowError::invalid_state(
                        "a comment is required to reject a report",
                    ));
                }
                ReportDecision::Approve | ReportDecision::Reject => {}
            }

            let approval = ReportApproval {
                id: ApprovalId::generate(),
                report_id: report_id.clone(),
                status: decision.resulting_status(),
                comment: comment.to_string(),
                approved_by: actor_id.clone(),
                file_hash: self.hasher.digest(&report.content),
                approved_at: self.clock.now(),
            };
            if let Some(checksum) = report.checksum.as_deref() {
                if checksum != approval.file_hash {
                    warn!(
                        expected = checksum,
                        actual = %approval.file_hash,
                        "Report content does not match its stored checksum"
                    );
                }
            }

            let propagated = scenario.map(|scenario| {
                let status = match decision {
                    ReportDecision::Approve => ScenarioStatus::Approved,
                    ReportDecision::Reject => ScenarioStatus::Reproved,
                };
                (scenario.id, status)
            });

            match self
                .repos
                .approvals
                .record_decision(approval.clone(), propagated.clone())
                .await
            {
                Ok(()) => {}
                Err(StoreError::Duplicate { .. }) => return Err(already_decided()),
                Err(err) => return Err(err.into()),
            }

            info!(
                approval.id = %approval.id,
                status = %approval.status,
                propagated = propagated.is_some(),
                "Report decided"
            );

            let (scenario_id, scenario_status) = propagated.unzip();
            Ok(ReportApprovalView {
                approval,
                scenario_id,
                scenario_status,
            })
        }
        .instrument(span)
        .await
    }

    /// The decision already on record for a report, if any
    pub async fn decision_for(&self, report_id: &ReportId) -> WorkflowResult<Option<ReportApproval>> {
        Ok(self.repos.approvals.find_for_report(report_id).await?)
    }

    async fn resolve_project(
        &self,
        parent: &ReportParent,
        scenario: Option<&TestScenario>,
    ) -> WorkflowResult<ProjectId> {
        match parent {
            ReportParent::Scenario { .. } => scenario
                .map(|s| s.project_id.clone())
                .ok_or_else(no_project),
            ReportParent::Package { package_id } => self
                .repos
                .packages
                .find_package_by_id(package_id)
                .await?
                .map(|p| p.project_id)
                .ok_or_else(no_project),
            ReportParent::Orphan => Err(no_project()),
        }
    }
}

fn already_decided() -> WorkflowError {
    WorkflowError::invalid_state("report has already been decided")
}

fn no_project() -> WorkflowError {
    WorkflowError::not_found("no project associated with this report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::external::hashing::MockContentHasher;
    use crate::external::Sha256Hasher;
    use crate::model::{ApprovalStatus, PackageId, PackageStatus, Role, TestReport};
    use crate::repository::{
        MockReportApprovalRepository, ReportRepository, ScenarioRepository,
    };
    use crate::testing::{t0, Fixture};

    fn engine(fx: &Fixture) -> ReportApprovalEngine {
        ReportApprovalEngine::new(fx.repos.clone(), fx.clock.clone(), Arc::new(Sha256Hasher))
    }

    async fn scenario_with_report(fx: &Fixture, approver: Option<&UserId>) -> (ScenarioId, ReportId) {
        let project = ProjectId::from("P1");
        let scenario_id = ScenarioId::from("scn-1");
        fx.store
            .insert_scenario(TestScenario {
                id: scenario_id.clone(),
                project_id: project,
                package_id: None,
                title: "Login works".to_string(),
                status: ScenarioStatus::Passed,
                tester_id: None,
                approver_id: approver.cloned(),
            })
            .await
            .unwrap();
        let report_id = ReportId::from("rep-1");
        fx.store
            .insert_report(TestReport {
                id: report_id.clone(),
                parent: ReportParent::Scenario {
                    scenario_id: scenario_id.clone(),
                },
                content: b"%PDF evidence".to_vec(),
                checksum: None,
                created_at: t0(),
            })
            .await
            .unwrap();
        (scenario_id, report_id)
    }

    #[tokio::test]
    async fn approver_decision_propagates_to_scenario() {
        let fx = Fixture::new();
        let project = fx.project("P1", "owner").await;
        let approver = fx.member(&project, "appr", Role::Approver).await;
        let (scenario_id, report_id) = scenario_with_report(&fx, Some(&approver)).await;

        let view = engine(&fx)
            .decide(&report_id, &approver, ReportDecision::Approve, None)
            .await
            .unwrap();

        assert_eq!(view.approval.status, ApprovalStatus::Approved);
        assert_eq!(view.approval.comment, "");
        assert_eq!(view.approval.file_hash, Sha256Hasher.digest(b"%PDF evidence"));
        assert_eq!(view.scenario_status, Some(ScenarioStatus::Approved));

        let scenario = fx.store.find_scenario(&scenario_id).await.unwrap().unwrap();
        assert_eq!(scenario.status, ScenarioStatus::Approved);
    }

    #[tokio::test]
    async fn rejection_needs_a_comment_and_marks_reproved() {
        let fx = Fixture::new();
        fx.project("P1", "owner").await;
        let owner = UserId::from("owner");
        let (scenario_id, report_id) = scenario_with_report(&fx, None).await;
        let engine = engine(&fx);

        let err = engine
            .decide(&report_id, &owner, ReportDecision::Reject, Some("  "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(fx.store.approval_count().await, 0);

        let view = engine
            .decide(&report_id, &owner, ReportDecision::Reject, Some(" blurry screenshots "))
            .await
            .unwrap();
        assert_eq!(view.approval.comment, "blurry screenshots");

        let scenario = fx.store.find_scenario(&scenario_id).await.unwrap().unwrap();
        assert_eq!(scenario.status, ScenarioStatus::Reproved);
    }

    #[tokio::test]
    async fn manager_role_alone_cannot_decide() {
        let fx = Fixture::new();
        let project = fx.project("P1", "owner").await;
        let manager = fx.member(&project, "mgr", Role::Manager).await;
        let approver = fx.member(&project, "appr", Role::Approver).await;
        let (_, report_id) = scenario_with_report(&fx, Some(&approver)).await;

        let err = engine(&fx)
            .decide(&report_id, &manager, ReportDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn second_decision_is_invalid_state() {
        let fx = Fixture::new();
        fx.project("P1", "owner").await;
        let owner = UserId::from("owner");
        let (_, report_id) = scenario_with_report(&fx, None).await;
        let engine = engine(&fx);
        assert!(engine.decision_for(&report_id).await.unwrap().is_none());

        engine
            .decide(&report_id, &owner, ReportDecision::Approve, None)
            .await
            .unwrap();
        let err = engine
            .decide(&report_id, &owner, ReportDecision::Reject, Some("changed my mind"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(fx.store.approval_count().await, 1);
        let recorded = engine.decision_for(&report_id).await.unwrap().unwrap();
        assert_eq!(recorded.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn package_report_resolves_project_and_leaves_scenarios_alone() {
        let fx = Fixture::new();
        let project = fx.project("P1", "owner").await;
        let package = fx
            .package(&project, "pkg", PackageStatus::InTesting, &[ScenarioStatus::Passed])
            .await;
        fx.store
            .insert_report(TestReport {
                id: ReportId::from("rep-pkg"),
                parent: ReportParent::Package {
                    package_id: package.clone(),
                },
                content: b"summary".to_vec(),
                checksum: None,
                created_at: t0(),
            })
            .await
            .unwrap();

        let view = engine(&fx)
            .decide(&ReportId::from("rep-pkg"), &UserId::from("owner"), ReportDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(view.scenario_id, None);

        let scenarios = fx.store.list_for_package(&package).await.unwrap();
        assert_eq!(scenarios[0].status, ScenarioStatus::Passed);
    }

    #[tokio::test]
    async fn orphan_and_missing_reports_are_not_found() {
        let fx = Fixture::new();
        fx.project("P1", "owner").await;
        fx.store
            .insert_report(TestReport {
                id: ReportId::from("orphan"),
                parent: ReportParent::Orphan,
                content: vec![],
                checksum: None,
                created_at: t0(),
            })
            .await
            .unwrap();
        let engine = engine(&fx);
        let owner = UserId::from("owner");

        let err = engine
            .decide(&ReportId::from("orphan"), &owner, ReportDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_body().message, "no project associated with this report");

        let err = engine
            .decide(&ReportId::from("nope"), &owner, ReportDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let missing_parent = TestReport {
            id: ReportId::from("dangling"),
            parent: ReportParent::Package {
                package_id: PackageId::from("gone"),
            },
            content: vec![1, 2, 3],
            checksum: None,
            created_at: t0(),
        };
        fx.store.insert_report(missing_parent).await.unwrap();
        let err = engine
            .decide(&ReportId::from("dangling"), &owner, ReportDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn duplicate_insert_from_a_racing_decider_is_invalid_state() {
        let fx = Fixture::new();
        fx.project("P1", "owner").await;
        let (scenario_id, report_id) = scenario_with_report(&fx, None).await;

        let mut approvals = MockReportApprovalRepository::new();
        approvals.expect_find_for_report().returning(|_| Ok(None));
        approvals.expect_record_decision().times(1).returning(|_, _| {
            Err(StoreError::Duplicate {
                constraint: "report_approvals.report_id".to_string(),
            })
        });

        let mut hasher = MockContentHasher::new();
        hasher
            .expect_digest()
            .withf(|content| *content == *b"%PDF evidence")
            .times(1)
            .returning(|_| "deadbeef".to_string());

        let mut repos = fx.repos.clone();
        repos.approvals = Arc::new(approvals);
        let engine = ReportApprovalEngine::new(repos, fx.clock.clone(), Arc::new(hasher));

        let err = engine
            .decide(&report_id, &UserId::from("owner"), ReportDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        // the loser must not touch the scenario
        let scenario = fx.store.find_scenario(&scenario_id).await.unwrap().unwrap();
        assert_eq!(scenario.status, ScenarioStatus::Passed);
    }

    #[tokio::test]
    async fn failed_scenario_write_leaves_the_report_decidable() {
        let fx = Fixture::new();
        fx.project("P1", "owner").await;
        let owner = UserId::from("owner");
        let (scenario_id, report_id) = scenario_with_report(&fx, None).await;

        let mut approvals = MockReportApprovalRepository::new();
        approvals.expect_find_for_report().returning(|_| Ok(None));
        approvals
            .expect_record_decision()
            .withf(|_, scenario| {
                matches!(scenario, Some((id, ScenarioStatus::Approved)) if id.as_str() == "scn-1")
            })
            .times(1)
            .returning(|_, _| Err(StoreError::Backend("write timeout".to_string())));

        let mut repos = fx.repos.clone();
        repos.approvals = Arc::new(approvals);
        let flaky = ReportApprovalEngine::new(repos, fx.clock.clone(), Arc::new(Sha256Hasher));

        let err = flaky
            .decide(&report_id, &owner, ReportDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(fx.store.approval_count().await, 0);

        let view = engine(&fx)
            .decide(&report_id, &owner, ReportDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(view.scenario_status, Some(ScenarioStatus::Approved));
        let scenario = fx.store.find_scenario(&scenario_id).await.unwrap().unwrap();
        assert_eq!(scenario.status, ScenarioStatus::Approved);
    }
}
