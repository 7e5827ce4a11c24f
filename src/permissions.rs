//! Permission policy
//!
//! Pure predicates over explicit role/identity facts. No lookups, no hidden
//! state: callers resolve membership and ownership first and pass the facts in.

use crate::errors::{WorkflowError, WorkflowResult};
use crate::model::Role;

/// OWNER may invite anyone; MANAGER may invite TESTER or APPROVER; nobody
/// else may invite.
pub fn can_invite(actor_role: Role, target_role: Role) -> bool {
    match actor_role {
        Role::Owner => true,
        Role::Manager => match target_role {
            Role::Tester | Role::Approver => true,
            Role::Owner | Role::Manager => false,
        },
        Role::Tester | Role::Approver => false,
    }
}

/// Package sign-off belongs to the project owner or a MANAGER.
pub fn can_approve_package(actor_role: Option<Role>, is_owner: bool) -> bool {
    is_owner || matches!(actor_role, Some(Role::Manager))
}

/// Report decisions belong to the project owner or the scenario's designated
/// approver. The MANAGER role alone does not qualify.
pub fn can_decide_report(is_owner: bool, is_scenario_approver: bool) -> bool {
    is_owner || is_scenario_approver
}

/// Turn a failed predicate into `Forbidden`
pub fn require(allowed: bool, message: impl Into<String>) -> WorkflowResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::forbidden(message))
    }
}
