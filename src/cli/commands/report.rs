use anyhow::Result;
use qa_review::model::{ReportDecision, ReportId, UserId};
use qa_review::ReviewService;
use std::process::ExitCode;

use super::{emit, Command};
use crate::cli::ReportArgs;

pub struct ReportCommand {
    report: ReportId,
    actor: UserId,
    comment: Option<String>,
    decision: ReportDecision,
}

impl ReportCommand {
    fn new(args: ReportArgs, decision: ReportDecision) -> Self {
        Self {
            report: ReportId::from(args.report),
            actor: UserId::from(args.actor),
            comment: args.comment,
            decision,
        }
    }

    pub fn approve(args: ReportArgs) -> Self {
        Self::new(args, ReportDecision::Approve)
    }

    pub fn reject(args: ReportArgs) -> Self {
        Self::new(args, ReportDecision::Reject)
    }
}

impl Command for ReportCommand {
    async fn execute(&self, service: &ReviewService) -> Result<ExitCode> {
        let comment = self.comment.as_deref();
        let outcome = match self.decision {
            ReportDecision::Approve => {
                eprintln!("📄 Approving report {}", self.report);
                service.approve_report(&self.report, &self.actor, comment).await
            }
            ReportDecision::Reject => {
                eprintln!("📄 Rejecting report {}", self.report);
                service.reject_report(&self.report, &self.actor, comment).await
            }
        };
        emit(outcome)
    }
}
