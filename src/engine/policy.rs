use crate::model::leave_request::LeaveRequest;
use crate::model::role::Role;
use crate::model::user::User;

use super::transition::LeaveAction;

/// Single authorization gate for every transition entry point.
///
/// Roles are flat: manager-stage decisions accept `manager` and `hr`
/// actors, HR-stage decisions accept only `hr`, and cancellation accepts
/// only the original requester. Once a request carries an assigned
/// manager, other managers may no longer decide it (HR still can).
pub fn can_perform(actor: &User, request: &LeaveRequest, action: LeaveAction) -> bool {
    if !actor.is_active {
        return false;
    }

    match action {
        LeaveAction::ManagerApprove | LeaveAction::ManagerReject => match actor.role {
            Role::Hr => true,
            Role::Manager => request.manager_id.is_none_or(|m| m == actor.id),
            Role::Employee => false,
        },
        LeaveAction::HrApprove | LeaveAction::HrReject => actor.role == Role::Hr,
        LeaveAction::Cancel => actor.id == request.user_id,
    }
}
