use clap::{Parser, Subcommand};
use qa_review::model::Role;

pub mod commands;

#[derive(Parser)]
#[command(name = "qa-review")]
#[command(about = "Invitation and approval workflows for QA test-management projects")]
#[command(long_about = "qa-review drives the review workflow against the configured database: \
                       invite collaborators, approve or reject test packages and reports, and \
                       leave projects. Results are printed as JSON on stdout.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Invite someone to a project, or re-deliver their open invitation
    Invite {
        #[arg(long, help = "Project the invitation is for")]
        project: String,
        #[arg(long, help = "User id of the inviting member")]
        actor: String,
        #[arg(long, help = "Address to invite (normalized before use)")]
        email: String,
        #[arg(long, help = "Role granted on acceptance: OWNER, MANAGER, TESTER or APPROVER")]
        role: Role,
        #[arg(long, help = "Resend the pending invitation instead of failing with a conflict")]
        resend: bool,
    },
    /// List every invitation issued to an address on a project
    Invites {
        #[arg(long, help = "Project to inspect")]
        project: String,
        #[arg(long, help = "Invited address")]
        email: String,
    },
    /// Archive past-due pending invitations as EXPIRED
    ExpireInvites,
    /// Leave a project (the owner cannot leave)
    Leave {
        #[arg(long, help = "Project to leave")]
        project: String,
        #[arg(long, help = "User id of the departing member")]
        actor: String,
    },
    /// Test package transitions
    Package {
        #[command(subcommand)]
        action: PackageAction,
    },
    /// Report decisions
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Subcommand)]
pub enum PackageAction {
    /// Move a CREATED package into testing
    Start(PackageArgs),
    /// Sign off a package whose scenarios are all APPROVED
    Approve(PackageArgs),
    /// Reject a package that is in testing
    Reject {
        #[command(flatten)]
        target: PackageArgs,
        #[arg(long, help = "Why the package was rejected (required)")]
        reason: String,
    },
    /// Send a rejected package back to testing
    SendToTest(PackageArgs),
}

#[derive(clap::Args)]
pub struct PackageArgs {
    #[arg(long, help = "Project owning the package")]
    pub project: String,
    #[arg(long, help = "Package id")]
    pub package: String,
    #[arg(long, help = "User id performing the transition")]
    pub actor: String,
}

#[derive(Subcommand)]
pub enum ReportAction {
    /// Approve a report
    Approve(ReportArgs),
    /// Reject a report (comment required)
    Reject(ReportArgs),
}

#[derive(clap::Args)]
pub struct ReportArgs {
    #[arg(long, help = "Report id")]
    pub report: String,
    #[arg(long, help = "User id deciding the report")]
    pub actor: String,
    #[arg(long, help = "Decision comment; required when rejecting")]
    pub comment: Option<String>,
}
