use anyhow::Result;
use qa_review::model::{PackageId, ProjectId, UserId};
use qa_review::ReviewService;
use std::process::ExitCode;

use super::{emit, Command};
use crate::cli::PackageArgs;

enum Transition {
    Start,
    Approve,
    Reject(String),
    SendToTest,
}

pub struct PackageCommand {
    project: ProjectId,
    package: PackageId,
    actor: UserId,
    transition: Transition,
}

impl PackageCommand {
    fn new(args: PackageArgs, transition: Transition) -> Self {
        Self {
            project: ProjectId::from(args.project),
            package: PackageId::from(args.package),
            actor: UserId::from(args.actor),
            transition,
        }
    }

    pub fn start(args: PackageArgs) -> Self {
        Self::new(args, Transition::Start)
    }

    pub fn approve(args: PackageArgs) -> Self {
        Self::new(args, Transition::Approve)
    }

    pub fn reject(args: PackageArgs, reason: String) -> Self {
        Self::new(args, Transition::Reject(reason))
    }

    pub fn send_to_test(args: PackageArgs) -> Self {
        Self::new(args, Transition::SendToTest)
    }
}

impl Command for PackageCommand {
    async fn execute(&self, service: &ReviewService) -> Result<ExitCode> {
        let (project, package, actor) = (&self.project, &self.package, &self.actor);
        let outcome = match &self.transition {
            Transition::Start => {
                eprintln!("🧪 Starting tests for package {package}");
                service.start_testing(project, package, actor).await
            }
            Transition::Approve => {
                eprintln!("✔️  Approving package {package}");
                service.approve_package(project, package, actor).await
            }
            Transition::Reject(reason) => {
                eprintln!("✖️  Rejecting package {package}");
                service.reject_package(project, package, actor, reason).await
            }
            Transition::SendToTest => {
                eprintln!("🔁 Sending package {package} back to test");
                service.send_package_to_test(project, package, actor).await
            }
        };
        emit(outcome)
    }
}
