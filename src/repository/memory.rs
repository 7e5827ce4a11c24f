//! In-memory store
//!
//! Implements every repository trait over a single `RwLock`, so each method
//! is atomic and the uniqueness rules hold under concurrent callers exactly
//! like the SQL constraints do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ExpiryScope, InviteRepository, MembershipRepository, PackageRepository, ProjectRepository,
    ReportApprovalRepository, ReportRepository, ScenarioRepository, StoreResult, UserRepository,
};
use crate::errors::StoreError;
use crate::model::{
    normalize_email, Invitation, InvitationId, InvitationStatus, Membership, PackageId,
    PackageStatus, Project, ProjectId, ReportApproval, ReportId, ScenarioId, ScenarioStatus,
    TestPackage, TestReport, TestScenario, User, UserId,
};

#[derive(Debug, Default)]
struct StoreState {
    projects: HashMap<ProjectId, Project>,
    users: HashMap<UserId, User>,
    memberships: HashMap<(UserId, ProjectId), Membership>,
    invitations: Vec<Invitation>,
    scenarios: HashMap<ScenarioId, TestScenario>,
    packages: HashMap<PackageId, TestPackage>,
    reports: HashMap<ReportId, TestReport>,
    approvals: HashMap<ReportId, ReportApproval>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invitation rows, all statuses
    pub async fn invitation_count(&self) -> usize {
        self.state.read().await.invitations.len()
    }

    /// Number of persisted report decisions
    pub async fn approval_count(&self) -> usize {
        self.state.read().await.approvals.len()
    }

    pub async fn find_invitation(&self, id: &InvitationId) -> Option<Invitation> {
        self.state
            .read()
            .await
            .invitations
            .iter()
            .find(|i| &i.id == id)
            .cloned()
    }

    /// Overwrite a scenario's status outside any workflow, for seeding state
    pub async fn set_scenario_status(
        &self,
        id: &ScenarioId,
        status: ScenarioStatus,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let scenario = state
            .scenarios
            .get_mut(id)
            .ok_or_else(|| StoreError::Backend(format!("scenario {id} vanished")))?;
        scenario.status = status;
        Ok(())
    }
}

impl StoreState {
    /// True when the package has scenarios and all of them are APPROVED
    fn fully_signed_off(&self, package_id: &PackageId) -> bool {
        let mut scenarios = self
            .scenarios
            .values()
            .filter(|s| s.package_id.as_ref() == Some(package_id))
            .peekable();
        scenarios.peek().is_some() && scenarios.all(|s| s.status == ScenarioStatus::Approved)
    }
}

fn duplicate(constraint: &str) -> StoreError {
    StoreError::Duplicate {
        constraint: constraint.to_string(),
    }
}

#[async_trait]
impl ProjectRepository for InMemoryStore {
    async fn find_project(&self, id: &ProjectId) -> StoreResult<Option<Project>> {
        Ok(self.state.read().await.projects.get(id).cloned())
    }

    async fn insert_project(&self, project: Project) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.projects.contains_key(&project.id) {
            return Err(duplicate("projects.id"));
        }
        state.projects.insert(project.id.clone(), project);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&self, mut user: User) -> StoreResult<()> {
        user.email = normalize_email(&user.email);
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.id) {
            return Err(duplicate("users.id"));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(duplicate("users.email"));
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for InMemoryStore {
    async fn find_membership(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .state
            .read()
            .await
            .memberships
            .get(&(user_id.clone(), project_id.clone()))
            .cloned())
    }

    async fn insert_membership(&self, membership: Membership) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let key = (membership.user_id.clone(), membership.project_id.clone());
        if state.memberships.contains_key(&key) {
            return Err(duplicate("memberships.user_id_project_id"));
        }
        state.memberships.insert(key, membership);
        Ok(())
    }

    async fn delete_membership(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .state
            .write()
            .await
            .memberships
            .remove(&(user_id.clone(), project_id.clone())))
    }
}

#[async_trait]
impl InviteRepository for InMemoryStore {
    async fn find_pending(
        &self,
        project_id: &ProjectId,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Invitation>> {
        Ok(self
            .state
            .read()
            .await
            .invitations
            .iter()
            .find(|i| &i.project_id == project_id && i.email == email && i.is_pending_at(now))
            .cloned())
    }

    async fn insert_invitation(&self, invitation: Invitation) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let clashes = state.invitations.iter().any(|i| {
            i.project_id == invitation.project_id
                && i.email == invitation.email
                && i.status == InvitationStatus::Pending
                && invitation.status == InvitationStatus::Pending
        });
        if clashes {
            return Err(duplicate("invitations.pending_project_email"));
        }
        if state.invitations.iter().any(|i| i.token == invitation.token) {
            return Err(duplicate("invitations.token"));
        }
        state.invitations.push(invitation);
        Ok(())
    }

    async fn expire_stale(&self, scope: ExpiryScope, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let mut archived = 0u64;
        for invitation in state.invitations.iter_mut() {
            if invitation.status == InvitationStatus::Pending
                && invitation.expires_at <= now
                && scope.matches(invitation)
            {
                invitation.status = InvitationStatus::Expired;
                archived += 1;
            }
        }
        if archived > 0 {
            debug!(archived, "Archived stale invitations");
        }
        Ok(archived)
    }

    async fn list_invitations(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> StoreResult<Vec<Invitation>> {
        let mut rows: Vec<Invitation> = self
            .state
            .read()
            .await
            .invitations
            .iter()
            .filter(|i| &i.project_id == project_id && i.email == email)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.created_at);
        Ok(rows)
    }
}

#[async_trait]
impl ScenarioRepository for InMemoryStore {
    async fn find_scenario(&self, id: &ScenarioId) -> StoreResult<Option<TestScenario>> {
        Ok(self.state.read().await.scenarios.get(id).cloned())
    }

    async fn list_for_package(&self, package_id: &PackageId) -> StoreResult<Vec<TestScenario>> {
        let mut scenarios: Vec<TestScenario> = self
            .state
            .read()
            .await
            .scenarios
            .values()
            .filter(|s| s.package_id.as_ref() == Some(package_id))
            .cloned()
            .collect();
        scenarios.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(scenarios)
    }

    async fn insert_scenario(&self, scenario: TestScenario) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.scenarios.contains_key(&scenario.id) {
            return Err(duplicate("test_scenarios.id"));
        }
        state.scenarios.insert(scenario.id.clone(), scenario);
        Ok(())
    }
}

#[async_trait]
impl PackageRepository for InMemoryStore {
    async fn find_package(
        &self,
        id: &PackageId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<TestPackage>> {
        Ok(self
            .state
            .read()
            .await
            .packages
            .get(id)
            .filter(|p| &p.project_id == project_id)
            .cloned())
    }

    async fn find_package_by_id(&self, id: &PackageId) -> StoreResult<Option<TestPackage>> {
        Ok(self.state.read().await.packages.get(id).cloned())
    }

    async fn save_transition(
        &self,
        package: TestPackage,
        expected: PackageStatus,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let signed_off = package.status != PackageStatus::Approved
            || state.fully_signed_off(&package.id);
        match state.packages.get_mut(&package.id) {
            Some(stored) if stored.status == expected && signed_off => {
                *stored = package;
                Ok(())
            }
            Some(_) => Err(StoreError::StaleState {
                entity: format!("test package {}", package.id),
            }),
            None => Err(StoreError::Backend(format!("test package {} vanished", package.id))),
        }
    }

    async fn insert_package(&self, package: TestPackage) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.packages.contains_key(&package.id) {
            return Err(duplicate("test_packages.id"));
        }
        state.packages.insert(package.id.clone(), package);
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for InMemoryStore {
    async fn find_report(&self, id: &ReportId) -> StoreResult<Option<TestReport>> {
        Ok(self.state.read().await.reports.get(id).cloned())
    }

    async fn insert_report(&self, report: TestReport) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.reports.contains_key(&report.id) {
            return Err(duplicate("test_reports.id"));
        }
        state.reports.insert(report.id.clone(), report);
        Ok(())
    }
}

#[async_trait]
impl ReportApprovalRepository for InMemoryStore {
    async fn find_for_report(&self, report_id: &ReportId) -> StoreResult<Option<ReportApproval>> {
        Ok(self.state.read().await.approvals.get(report_id).cloned())
    }

    async fn record_decision(
        &self,
        approval: ReportApproval,
        scenario: Option<(ScenarioId, ScenarioStatus)>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.approvals.contains_key(&approval.report_id) {
            return Err(duplicate("report_approvals.report_id"));
        }
        if let Some((scenario_id, status)) = scenario {
            let stored = state.scenarios.get_mut(&scenario_id).ok_or_else(|| {
                StoreError::Backend(format!("scenario {scenario_id} vanished"))
            })?;
            stored.status = status;
        }
        state.approvals.insert(approval.report_id.clone(), approval);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApprovalId, ApprovalStatus, Role};
    use chrono::Duration;

    fn invitation(token: &str, expires_at: DateTime<Utc>) -> Invitation {
        Invitation {
            id: InvitationId::generate(),
            project_id: ProjectId::from("P1"),
            email: "a@b.com".to_string(),
            role: Role::Tester,
            token: token.to_string(),
            status: InvitationStatus::Pending,
            invited_by_id: UserId::from("owner"),
            expires_at,
            created_at: expires_at - Duration::days(7),
        }
    }

    #[tokio::test]
    async fn second_pending_invite_for_same_key_is_rejected() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.insert_invitation(invitation("t1", now + Duration::days(7))).await.unwrap();

        let err = store
            .insert_invitation(invitation("t2", now + Duration::days(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn expiring_stale_rows_frees_the_key() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.insert_invitation(invitation("t1", now - Duration::hours(1))).await.unwrap();

        let archived = store
            .expire_stale(ExpiryScope::key(&ProjectId::from("P1"), "a@b.com"), now)
            .await
            .unwrap();
        assert_eq!(archived, 1);

        store.insert_invitation(invitation("t2", now + Duration::days(7))).await.unwrap();
        let rows = store.list_invitations(&ProjectId::from("P1"), "a@b.com").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, InvitationStatus::Expired);
        assert!(rows[1].is_pending_at(now));
    }

    #[tokio::test]
    async fn expiry_scope_leaves_other_keys_alone() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut other = invitation("t9", now - Duration::hours(1));
        other.email = "other@b.com".to_string();
        store.insert_invitation(other).await.unwrap();

        let archived = store
            .expire_stale(ExpiryScope::key(&ProjectId::from("P1"), "a@b.com"), now)
            .await
            .unwrap();
        assert_eq!(archived, 0);
        assert_eq!(store.expire_stale(ExpiryScope::everywhere(), now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn package_compare_and_set_detects_lost_race() {
        let store = InMemoryStore::new();
        let mut package = TestPackage::new(PackageId::from("pkg"), ProjectId::from("P1"), "Pkg");
        package.status = PackageStatus::InTesting;
        store.insert_package(package.clone()).await.unwrap();

        let mut first = package.clone();
        first.mark_rejected(UserId::from("m"), Utc::now(), "no".to_string());
        store.save_transition(first, PackageStatus::InTesting).await.unwrap();

        let mut second = package;
        second.mark_approved(UserId::from("o"), Utc::now());
        let err = store
            .save_transition(second, PackageStatus::InTesting)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState { .. }));
    }

    #[tokio::test]
    async fn package_lookup_is_project_scoped() {
        let store = InMemoryStore::new();
        store
            .insert_package(TestPackage::new(PackageId::from("pkg"), ProjectId::from("P1"), "Pkg"))
            .await
            .unwrap();

        assert!(store.find_package(&PackageId::from("pkg"), &ProjectId::from("P1")).await.unwrap().is_some());
        assert!(store.find_package(&PackageId::from("pkg"), &ProjectId::from("P2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn one_decision_per_report() {
        let store = InMemoryStore::new();
        let approval = ReportApproval {
            id: ApprovalId::generate(),
            report_id: ReportId::from("r1"),
            status: ApprovalStatus::Approved,
            comment: String::new(),
            approved_by: UserId::from("owner"),
            file_hash: "00".to_string(),
            approved_at: Utc::now(),
        };
        store.record_decision(approval.clone(), None).await.unwrap();

        let mut again = approval;
        again.id = ApprovalId::generate();
        again.status = ApprovalStatus::Rejected;
        assert!(matches!(
            store.record_decision(again, None).await.unwrap_err(),
            StoreError::Duplicate { .. }
        ));
        assert_eq!(store.approval_count().await, 1);
    }

    fn scenario(id: &str, status: ScenarioStatus) -> TestScenario {
        TestScenario {
            id: ScenarioId::from(id),
            project_id: ProjectId::from("P1"),
            package_id: Some(PackageId::from("pkg")),
            title: id.to_string(),
            status,
            tester_id: None,
            approver_id: None,
        }
    }

    fn approval(report: &str) -> ReportApproval {
        ReportApproval {
            id: ApprovalId::generate(),
            report_id: ReportId::from(report),
            status: ApprovalStatus::Rejected,
            comment: "flaky".to_string(),
            approved_by: UserId::from("owner"),
            file_hash: "00".to_string(),
            approved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn decision_and_scenario_status_land_together() {
        let store = InMemoryStore::new();
        store.insert_scenario(scenario("s1", ScenarioStatus::Passed)).await.unwrap();

        store
            .record_decision(
                approval("r1"),
                Some((ScenarioId::from("s1"), ScenarioStatus::Reproved)),
            )
            .await
            .unwrap();

        let stored = store.find_scenario(&ScenarioId::from("s1")).await.unwrap().unwrap();
        assert_eq!(stored.status, ScenarioStatus::Reproved);
        assert_eq!(store.approval_count().await, 1);
    }

    #[tokio::test]
    async fn failed_scenario_write_records_no_decision() {
        let store = InMemoryStore::new();

        let err = store
            .record_decision(
                approval("r1"),
                Some((ScenarioId::from("gone"), ScenarioStatus::Approved)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.approval_count().await, 0);
        assert!(store.find_for_report(&ReportId::from("r1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn approval_write_requires_every_scenario_signed_off() {
        let store = InMemoryStore::new();
        let mut package = TestPackage::new(PackageId::from("pkg"), ProjectId::from("P1"), "Pkg");
        package.status = PackageStatus::InTesting;
        store.insert_package(package.clone()).await.unwrap();
        store.insert_scenario(scenario("s1", ScenarioStatus::Approved)).await.unwrap();
        store.insert_scenario(scenario("s2", ScenarioStatus::Reproved)).await.unwrap();

        let mut approved = package.clone();
        approved.mark_approved(UserId::from("o"), Utc::now());
        let err = store
            .save_transition(approved.clone(), PackageStatus::InTesting)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState { .. }));

        // the same write goes through once the last scenario is signed off
        store
            .set_scenario_status(&ScenarioId::from("s2"), ScenarioStatus::Approved)
            .await
            .unwrap();
        store.save_transition(approved, PackageStatus::InTesting).await.unwrap();
        let stored = store.find_package_by_id(&package.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PackageStatus::Approved);
    }

    #[tokio::test]
    async fn approval_write_without_scenarios_is_refused() {
        let store = InMemoryStore::new();
        let mut package = TestPackage::new(PackageId::from("pkg"), ProjectId::from("P1"), "Pkg");
        package.status = PackageStatus::InTesting;
        store.insert_package(package.clone()).await.unwrap();

        package.mark_approved(UserId::from("o"), Utc::now());
        let err = store
            .save_transition(package, PackageStatus::InTesting)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState { .. }));
    }

    #[tokio::test]
    async fn stored_emails_are_normalized() {
        let store = InMemoryStore::new();
        store
            .insert_user(User {
                id: UserId::from("tess"),
                email: "  Tess@Example.COM ".to_string(),
                name: None,
            })
            .await
            .unwrap();

        let found = store.find_user_by_email("tess@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, UserId::from("tess"));
        assert_eq!(found.email, "tess@example.com");
    }
}
