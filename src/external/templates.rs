use chrono::{DateTime, Utc};

use crate::model::{Role, TestPackage};

/// Rendered subject and body, ready for a [`super::NotificationSender`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

pub fn invitation(
    subject_prefix: &str,
    project_name: &str,
    role: Role,
    accept_url: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Notification {
    let subject = format!("{subject_prefix} Invitation to join {project_name}");
    let body = format!(
        "You have been invited to join the project \"{project_name}\" as {role}.\n\n\
         Accept the invitation: {accept_url}{token}\n\n\
         This invitation expires on {}.",
        expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Notification { subject, body }
}

pub fn package_rejected(subject_prefix: &str, package: &TestPackage, reason: &str) -> Notification {
    let subject = format!("{subject_prefix} Test package \"{}\" was rejected", package.title);
    let body = format!(
        "The test package \"{}\" was rejected and needs another testing round.\n\n\
         Reason: {reason}",
        package.title
    );
    Notification { subject, body }
}
