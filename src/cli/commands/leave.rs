use anyhow::Result;
use qa_review::model::{ProjectId, UserId};
use qa_review::ReviewService;
use std::process::ExitCode;

use super::{emit, Command};

pub struct LeaveCommand {
    pub project: String,
    pub actor: String,
}

impl Command for LeaveCommand {
    async fn execute(&self, service: &ReviewService) -> Result<ExitCode> {
        let project = ProjectId::from(self.project.as_str());
        let actor = UserId::from(self.actor.as_str());
        eprintln!("👋 {actor} leaving {project}");
        emit(service.leave(&project, &actor).await)
    }
}
