use anyhow::Result;
use qa_review::{ErrorKind, ReviewService, WorkflowResult};
use serde::Serialize;
use std::process::ExitCode;

pub mod invite;
pub mod leave;
pub mod package;
pub mod report;

use super::{Commands, PackageAction, ReportAction};

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, service: &ReviewService) -> Result<ExitCode>;
}

impl Commands {
    pub async fn execute(self, service: &ReviewService) -> Result<ExitCode> {
        match self {
            Commands::Invite {
                project,
                actor,
                email,
                role,
                resend,
            } => {
                invite::InviteCommand::new(project, actor, email, role, resend)
                    .execute(service)
                    .await
            }
            Commands::Invites { project, email } => {
                invite::HistoryCommand { project, email }.execute(service).await
            }
            Commands::ExpireInvites => invite::ExpireCommand.execute(service).await,
            Commands::Leave { project, actor } => {
                leave::LeaveCommand { project, actor }.execute(service).await
            }
            Commands::Package { action } => {
                let command = match action {
                    PackageAction::Start(target) => package::PackageCommand::start(target),
                    PackageAction::Approve(target) => package::PackageCommand::approve(target),
                    PackageAction::Reject { target, reason } => {
                        package::PackageCommand::reject(target, reason)
                    }
                    PackageAction::SendToTest(target) => {
                        package::PackageCommand::send_to_test(target)
                    }
                };
                command.execute(service).await
            }
            Commands::Report { action } => {
                let command = match action {
                    ReportAction::Approve(args) => report::ReportCommand::approve(args),
                    ReportAction::Reject(args) => report::ReportCommand::reject(args),
                };
                command.execute(service).await
            }
        }
    }
}

/// Print the outcome as JSON on stdout. Workflow failures print their
/// `ErrorBody` instead and turn into a non-zero exit code.
pub fn emit<T: Serialize>(outcome: WorkflowResult<T>) -> Result<ExitCode> {
    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            eprintln!("✅ Done");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let body = err.to_body();
            println!("{}", serde_json::to_string_pretty(&body)?);
            eprintln!("❌ {}", body.message);
            Ok(ExitCode::from(exit_code(body.kind)))
        }
    }
}

/// Process exit status for each error kind
pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Forbidden => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::Conflict => 5,
        ErrorKind::InvalidState => 6,
    }
}
