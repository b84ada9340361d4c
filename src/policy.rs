//! Who may message whom.
//!
//! Assignment links live on the employee record and point upward
//! (`assigned_hr`, `assigned_pm`), so each rule dereferences the link from
//! whichever side stores it. HR/PM to employee and employee to HR/PM agree,
//! which keeps linked pairs symmetric without relying on it structurally.

use crate::models::employee::{ Employee, Role };

/// Whether `from` may send a message to `to`.
pub fn can_message(from: &Employee, to: &Employee) -> bool {
    if from.id == to.id {
        return false;
    }

    match (from.role, to.role) {
        (Role::Director, to_role) => matches!(to_role, Role::Hr | Role::ProjectManager | Role::Employee),

        (Role::Hr, Role::Director) => true,
        (Role::Hr, Role::Employee) => to.assigned_hr.as_deref() == Some(from.id.as_str()),
        (Role::Hr, _) => false,

        (Role::ProjectManager, Role::Director) => true,
        (Role::ProjectManager, Role::Employee) => to.assigned_pm.as_deref() == Some(from.id.as_str()),
        (Role::ProjectManager, _) => false,

        (Role::Employee, Role::Director) => true,
        (Role::Employee, Role::Hr) => from.assigned_hr.as_deref() == Some(to.id.as_str()),
        (Role::Employee, Role::ProjectManager) => from.assigned_pm.as_deref() == Some(to.id.as_str()),
        (Role::Employee, _) => false,

        (Role::Unknown, _) => false,
    }
}

/// Visibility of an existing conversation: either direction is enough.
pub fn can_see_conversation(a: &Employee, b: &Employee) -> bool {
    can_message(a, b) || can_message(b, a)
}
