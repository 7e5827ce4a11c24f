use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::errors::{WorkflowError, WorkflowResult};
use crate::model::{ProjectId, Role, UserId};
use crate::repository::Repositories;
use crate::telemetry::{create_operation_span, generate_correlation_id};

/// Confirmation returned after a member leaves a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveOutcome {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub role: Role,
    pub message: String,
}

pub struct MembershipLifecycle {
    repos: Repositories,
}

impl MembershipLifecycle {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Voluntary departure. Checks run in a fixed order: project exists,
    /// caller is not the owner, caller is a member.
    pub async fn leave(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> WorkflowResult<LeaveOutcome> {
        let correlation_id = generate_correlation_id();
        let span = create_operation_span(
            "leave_project",
            Some(user_id.as_str()),
            Some(project_id.as_str()),
            Some(&correlation_id),
        );

        async {
            let project = self
                .repos
                .projects
                .find_project(project_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found(format!("project {project_id} not found")))?;

            if project.is_owner(user_id) {
                return Err(WorkflowError::forbidden(
                    "the project owner cannot leave; transfer ownership first",
                ));
            }

            let removed = self
                .repos
                .memberships
                .delete_membership(user_id, project_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("not a member of this project"))?;

            info!(role = %removed.role, "Member left project");
            Ok(LeaveOutcome {
                project_id: project.id,
                user_id: removed.user_id,
                role: removed.role,
                message: format!("left {} (was {})", project.name, removed.role),
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::repository::MembershipRepository;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn member_leaves_and_gets_prior_role_back() {
        let fx = Fixture::new();
        let project = fx.project("P1", "owner").await;
        let tester = fx.member(&project, "tess", Role::Tester).await;
        let lifecycle = MembershipLifecycle::new(fx.repos.clone());

        let outcome = lifecycle.leave(&project, &tester).await.unwrap();
        assert_eq!(outcome.role, Role::Tester);
        assert_eq!(outcome.user_id, tester);
        assert!(fx.store.find_membership(&tester, &project).await.unwrap().is_none());

        let err = lifecycle.leave(&project, &tester).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_body().message, "not a member of this project");
    }

    #[tokio::test]
    async fn checks_fire_in_order() {
        let fx = Fixture::new();
        let project = fx.project("P1", "owner").await;
        let lifecycle = MembershipLifecycle::new(fx.repos.clone());

        // missing project beats everything else
        let err = lifecycle
            .leave(&ProjectId::from("nope"), &UserId::from("owner"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_body().message.starts_with("project"));

        let err = lifecycle.leave(&project, &UserId::from("owner")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(fx
            .store
            .find_membership(&UserId::from("owner"), &project)
            .await
            .unwrap()
            .is_some());
    }
}
