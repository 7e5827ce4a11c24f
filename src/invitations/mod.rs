//! Invitation ledger
//!
//! Issues, deduplicates and re-delivers project invitations. At most one
//! PENDING, unexpired invitation exists per (project, normalized email); the
//! storage layer backs the read check with a uniqueness rule, and a lost
//! insert race is folded back into the "already pending" branch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

use crate::config::{InvitationConfig, NotificationConfig};
use crate::errors::{StoreError, WorkflowError, WorkflowResult};
use crate::external::{templates, Clock, NotificationSender, TokenGenerator};
use crate::model::{
    is_plausible_email, normalize_email, Invitation, InvitationId, InvitationStatus, Project,
    ProjectId, Role, UserId,
};
use crate::permissions::{can_invite, require};
use crate::repository::{ExpiryScope, Repositories};
use crate::telemetry::{create_operation_span, generate_correlation_id};

/// Whether a call created a new invitation or re-delivered an open one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteDelivery {
    Created,
    Resent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteOutcome {
    pub invitation: Invitation,
    pub delivery: InviteDelivery,
}

/// Caller-facing shape of an invitation. The token is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationView {
    pub id: InvitationId,
    pub project_id: ProjectId,
    pub email: String,
    pub role: Role,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Invitation> for InvitationView {
    fn from(invitation: &Invitation) -> Self {
        Self {
            id: invitation.id.clone(),
            project_id: invitation.project_id.clone(),
            email: invitation.email.clone(),
            role: invitation.role,
            status: invitation.status,
            expires_at: invitation.expires_at,
            created_at: invitation.created_at,
        }
    }
}

pub struct InvitationLedger {
    repos: Repositories,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenGenerator>,
    notifier: Arc<dyn NotificationSender>,
    ttl: Duration,
    accept_url: String,
    subject_prefix: String,
}

impl InvitationLedger {
    pub fn new(
        repos: Repositories,
        clock: Arc<dyn Clock>,
        tokens: Arc<dyn TokenGenerator>,
        notifier: Arc<dyn NotificationSender>,
        invitations: &InvitationConfig,
        notifications: &NotificationConfig,
    ) -> Self {
        Self {
            repos,
            clock,
            tokens,
            notifier,
            ttl: Duration::days(invitations.effective_ttl_days()),
            accept_url: invitations.accept_url.clone(),
            subject_prefix: notifications.subject_prefix.clone(),
        }
    }

    /// Invite `email` to the project, or re-deliver the open invitation when
    /// `resend_if_pending` is set. Exactly one notification goes out on
    /// success and none on failure.
    pub async fn create_or_resend_invite(
        &self,
        project_id: &ProjectId,
        email: &str,
        role: Role,
        invited_by_id: &UserId,
        resend_if_pending: bool,
    ) -> WorkflowResult<InviteOutcome> {
        let correlation_id = generate_correlation_id();
        let span = create_operation_span(
            "create_or_resend_invite",
            Some(invited_by_id.as_str()),
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

            let inviter = self
                .repos
                .memberships
                .find_membership(invited_by_id, project_id)
                .await?
                .ok_or_else(|| WorkflowError::forbidden("inviter is not a member of this project"))?;

            require(
                can_invite(inviter.role, role),
                format!("{} may not invite {}", inviter.role, role),
            )?;

            let email = normalize_email(email);
            if !is_plausible_email(&email) {
                return Err(WorkflowError::invalid_state("a valid email address is required"));
            }

            if let Some(user) = self.repos.users.find_user_by_email(&email).await? {
                if self
                    .repos
                    .memberships
                    .find_membership(&user.id, project_id)
                    .await?
                    .is_some()
                {
                    return Err(WorkflowError::conflict("user is already a member of this project"));
                }
            }

            let now = self.clock.now();
            if let Some(existing) = self.repos.invites.find_pending(project_id, &email, now).await? {
                return self.resend_or_conflict(&project, existing, resend_if_pending).await;
            }

            // Past-due PENDING rows still hold the key until archived
            let archived = self
                .repos
                .invites
                .expire_stale(ExpiryScope::key(project_id, &email), now)
                .await?;
            if archived > 0 {
                debug!(archived, "Archived stale invitations before re-inviting");
            }

            let invitation = Invitation {
                id: InvitationId::generate(),
                project_id: project_id.clone(),
                email: email.clone(),
                role,
                token: self.tokens.generate(),
                status: InvitationStatus::Pending,
                invited_by_id: invited_by_id.clone(),
                expires_at: now + self.ttl,
                created_at: now,
            };

            match self.repos.invites.insert_invitation(invitation.clone()).await {
                Ok(()) => {}
                Err(StoreError::Duplicate { constraint }) => {
                    debug!(
                        constraint = constraint.as_str(),
                        "Lost invitation insert race, re-reading pending row"
                    );
                    let existing = self
                        .repos
                        .invites
                        .find_pending(project_id, &email, now)
                        .await?
                        .ok_or(StoreError::Duplicate { constraint })?;
                    return self.resend_or_conflict(&project, existing, resend_if_pending).await;
                }
                Err(err) => return Err(err.into()),
            }

            self.deliver(&project, &invitation).await?;
            info!(
                invitation.id = %invitation.id,
                role = %invitation.role,
                expires_at = %invitation.expires_at,
                "Invitation created"
            );

            Ok(InviteOutcome {
                invitation,
                delivery: InviteDelivery::Created,
            })
        }
        .instrument(span)
        .await
    }

    /// Archive every past-due PENDING invitation. Returns how many changed.
    pub async fn expire_stale_invitations(&self) -> WorkflowResult<u64> {
        let now = self.clock.now();
        let archived = self
            .repos
            .invites
            .expire_stale(ExpiryScope::everywhere(), now)
            .await?;
        info!(archived, "Expired stale invitations");
        Ok(archived)
    }

    /// Every invitation issued for (project, email), oldest first, with
    /// past-due PENDING rows reported as EXPIRED.
    pub async fn history(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> WorkflowResult<Vec<InvitationView>> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let invitations = self.repos.invites.list_invitations(project_id, &email).await?;

        Ok(invitations
            .iter()
            .map(|invitation| InvitationView {
                status: invitation.effective_status(now),
                ..InvitationView::from(invitation)
            })
            .collect())
    }

    async fn resend_or_conflict(
        &self,
        project: &Project,
        existing: Invitation,
        resend_if_pending: bool,
    ) -> WorkflowResult<InviteOutcome> {
        if !resend_if_pending {
            return Err(WorkflowError::conflict(
                "a pending invitation already exists for this email",
            ));
        }

        self.deliver(project, &existing).await?;
        info!(invitation.id = %existing.id, "Invitation resent");

        Ok(InviteOutcome {
            invitation: existing,
            delivery: InviteDelivery::Resent,
        })
    }

    async fn deliver(&self, project: &Project, invitation: &Invitation) -> WorkflowResult<()> {
        let notification = templates::invitation(
            &self.subject_prefix,
            &project.name,
            invitation.role,
            &self.accept_url,
            &invitation.token,
            invitation.expires_at,
        );

        if let Err(err) = self
            .notifier
            .send(&invitation.email, &notification.subject, &notification.body)
            .await
        {
            error!(invitation.id = %invitation.id, error = %err, "Invitation delivery failed");
            return Err(err.into());
        }
        Ok(())
    }
}
