use anyhow::Result;
use qa_review::model::{ProjectId, Role, UserId};
use qa_review::ReviewService;
use serde_json::json;
use std::process::ExitCode;

use super::{emit, Command};

pub struct InviteCommand {
    project: ProjectId,
    actor: UserId,
    email: String,
    role: Role,
    resend: bool,
}

impl InviteCommand {
    pub fn new(project: String, actor: String, email: String, role: Role, resend: bool) -> Self {
        Self {
            project: ProjectId::from(project),
            actor: UserId::from(actor),
            email,
            role,
            resend,
        }
    }
}

impl Command for InviteCommand {
    async fn execute(&self, service: &ReviewService) -> Result<ExitCode> {
        eprintln!("📨 Inviting {} to {} as {}", self.email.trim(), self.project, self.role);
        emit(
            service
                .invite(&self.project, &self.actor, &self.email, self.role, self.resend)
                .await,
        )
    }
}

pub struct HistoryCommand {
    pub project: String,
    pub email: String,
}

impl Command for HistoryCommand {
    async fn execute(&self, service: &ReviewService) -> Result<ExitCode> {
        let project = ProjectId::from(self.project.as_str());
        emit(service.invitation_history(&project, &self.email).await)
    }
}

pub struct ExpireCommand;

impl Command for ExpireCommand {
    async fn execute(&self, service: &ReviewService) -> Result<ExitCode> {
        eprintln!("🧹 Archiving past-due invitations");
        emit(
            service
                .expire_invitations()
                .await
                .map(|archived| json!({ "expired": archived })),
        )
    }
}
