// Shared harness for integration tests: an in-memory store, a fixed clock and
// a recording notifier wired into a ReviewService.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use qa_review::config::ReviewConfig;
use qa_review::external::{FixedClock, RecordingNotifier, SecureTokenGenerator, Sha256Hasher};
use qa_review::model::{
    Membership, PackageId, PackageStatus, Project, ProjectId, ReportId, ReportParent, Role,
    ScenarioId, ScenarioStatus, TestPackage, TestReport, TestScenario, User, UserId,
};
use qa_review::repository::{
    MembershipRepository, PackageRepository, ProjectRepository, ReportRepository,
    ScenarioRepository, UserRepository,
};
use qa_review::{Collaborators, InMemoryStore, Repositories, ReviewService};
use std::sync::Arc;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 12, 8, 0, 0).unwrap()
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<ReviewService>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::new(start()));
        let notifier = Arc::new(RecordingNotifier::new());
        let collaborators = Collaborators {
            clock: clock.clone(),
            tokens: Arc::new(SecureTokenGenerator),
            hasher: Arc::new(Sha256Hasher),
            notifier: notifier.clone(),
        };
        let service = ReviewService::new(
            Repositories::from_store(store.clone()),
            collaborators,
            &ReviewConfig::default(),
        );

        Self {
            store,
            clock,
            notifier,
            service: Arc::new(service),
        }
    }

    pub async fn user(&self, id: &str) -> UserId {
        self.store
            .insert_user(User {
                id: UserId::from(id),
                email: format!("{id}@qa.test"),
                name: Some(id.to_string()),
            })
            .await
            .unwrap();
        UserId::from(id)
    }

    pub async fn project(&self, id: &str, owner: &str) -> ProjectId {
        let owner_id = self.user(owner).await;
        self.store
            .insert_project(Project {
                id: ProjectId::from(id),
                name: format!("{id} project"),
                owner_id: owner_id.clone(),
            })
            .await
            .unwrap();
        let project_id = ProjectId::from(id);
        self.grant(&project_id, &owner_id, Role::Owner).await;
        project_id
    }

    pub async fn member(&self, project: &ProjectId, user: &str, role: Role) -> UserId {
        let user_id = self.user(user).await;
        self.grant(project, &user_id, role).await;
        user_id
    }

    pub async fn grant(&self, project: &ProjectId, user_id: &UserId, role: Role) {
        self.store
            .insert_membership(Membership {
                user_id: user_id.clone(),
                project_id: project.clone(),
                role,
                joined_at: start(),
            })
            .await
            .unwrap();
    }

    pub async fn package(
        &self,
        project: &ProjectId,
        id: &str,
        status: PackageStatus,
        scenarios: &[ScenarioStatus],
    ) -> PackageId {
        let package_id = PackageId::from(id);
        let mut package = TestPackage::new(package_id.clone(), project.clone(), format!("{id} bundle"));
        package.status = status;
        self.store.insert_package(package).await.unwrap();

        for (n, status) in scenarios.iter().enumerate() {
            self.scenario(project, &format!("{id}-{n}"), Some(&package_id), *status, None)
                .await;
        }
        package_id
    }

    pub async fn scenario(
        &self,
        project: &ProjectId,
        id: &str,
        package: Option<&PackageId>,
        status: ScenarioStatus,
        approver: Option<&UserId>,
    ) -> ScenarioId {
        self.store
            .insert_scenario(TestScenario {
                id: ScenarioId::from(id),
                project_id: project.clone(),
                package_id: package.cloned(),
                title: format!("scenario {id}"),
                status,
                tester_id: None,
                approver_id: approver.cloned(),
            })
            .await
            .unwrap();
        ScenarioId::from(id)
    }

    pub async fn report(&self, id: &str, parent: ReportParent, content: &[u8]) -> ReportId {
        self.store
            .insert_report(TestReport {
                id: ReportId::from(id),
                parent,
                content: content.to_vec(),
                checksum: None,
                created_at: start(),
            })
            .await
            .unwrap();
        ReportId::from(id)
    }
}
