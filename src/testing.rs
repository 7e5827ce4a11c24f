// Shared fixtures for engine unit tests

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use crate::config::{InvitationConfig, NotificationConfig};
use crate::external::{FixedClock, RecordingNotifier};
use crate::model::{
    Membership, PackageId, PackageStatus, Project, ProjectId, Role, ScenarioId, ScenarioStatus,
    TestPackage, TestScenario, User, UserId,
};
use crate::repository::{
    InMemoryStore, MembershipRepository, PackageRepository, ProjectRepository, Repositories,
    ScenarioRepository, UserRepository,
};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub(crate) struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub repos: Repositories,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub invitations: InvitationConfig,
    pub notifications: NotificationConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            repos: Repositories::from_store(store.clone()),
            store,
            clock: Arc::new(FixedClock::new(t0())),
            notifier: Arc::new(RecordingNotifier::new()),
            invitations: InvitationConfig {
                ttl_days: Some(7),
                accept_url: "https://qa.example.com/invites/".to_string(),
            },
            notifications: NotificationConfig {
                from_address: "qa@example.com".to_string(),
                subject_prefix: "[QA]".to_string(),
            },
        }
    }

    pub async fn user(&self, id: &str) -> UserId {
        let user = User {
            id: UserId::from(id),
            email: format!("{id}@example.com"),
            name: None,
        };
        self.store.insert_user(user).await.unwrap();
        UserId::from(id)
    }

    /// Project `id` owned by `owner`, who also holds the OWNER membership
    pub async fn project(&self, id: &str, owner: &str) -> ProjectId {
        let owner_id = self.user(owner).await;
        let project = Project {
            id: ProjectId::from(id),
            name: format!("Project {id}"),
            owner_id: owner_id.clone(),
        };
        self.store.insert_project(project).await.unwrap();
        self.join(id, &owner_id, Role::Owner).await;
        ProjectId::from(id)
    }

    pub async fn member(&self, project: &ProjectId, user: &str, role: Role) -> UserId {
        let user_id = self.user(user).await;
        self.join(project.as_str(), &user_id, role).await;
        user_id
    }

    async fn join(&self, project: &str, user_id: &UserId, role: Role) {
        self.store
            .insert_membership(Membership {
                user_id: user_id.clone(),
                project_id: ProjectId::from(project),
                role,
                joined_at: t0(),
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
        let mut package = TestPackage::new(package_id.clone(), project.clone(), format!("Package {id}"));
        package.status = status;
        self.store.insert_package(package).await.unwrap();

        for (n, status) in scenarios.iter().enumerate() {
            self.store
                .insert_scenario(TestScenario {
                    id: ScenarioId::from(format!("{id}-s{n}")),
                    project_id: project.clone(),
                    package_id: Some(package_id.clone()),
                    title: format!("Scenario {n}"),
                    status: *status,
                    tester_id: None,
                    approver_id: None,
                })
                .await
                .unwrap();
        }
        package_id
    }
}
