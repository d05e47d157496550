use strum_macros::Display;

use crate::model::leave_audit::AuditAction;
use crate::model::leave_request::LeaveStatus;

use super::events::LeaveEventType;

/// Actions that drive a request through the pipeline after submission.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LeaveAction {
    ManagerApprove,
    ManagerReject,
    HrApprove,
    HrReject,
    Cancel,
}

/// Ledger adjustment a transition carries.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LedgerEffect {
    /// Units stay reserved (manager approval).
    Keep,
    /// Reservation is given back (rejection, cancellation).
    Release,
    /// Reservation becomes confirmed consumption (HR approval).
    Consume,
}

/// The fixed transition table. Returns the successor status, or None when
/// the action is not legal from `from` (including every terminal status).
pub fn next_status(from: LeaveStatus, action: LeaveAction) -> Option<LeaveStatus> {
    match (from, action) {
        (LeaveStatus::Pending, LeaveAction::ManagerApprove) => Some(LeaveStatus::ManagerApproved),
        (LeaveStatus::Pending, LeaveAction::ManagerReject) => Some(LeaveStatus::ManagerRejected),
        (LeaveStatus::ManagerApproved, LeaveAction::HrApprove) => Some(LeaveStatus::HrApproved),
        (LeaveStatus::ManagerApproved, LeaveAction::HrReject) => Some(LeaveStatus::HrRejected),
        (LeaveStatus::Pending | LeaveStatus::ManagerApproved, LeaveAction::Cancel) => {
            Some(LeaveStatus::Cancelled)
        }
        _ => None,
    }
}

pub fn ledger_effect(action: LeaveAction) -> LedgerEffect {
    match action {
        LeaveAction::ManagerApprove => LedgerEffect::Keep,
        LeaveAction::ManagerReject | LeaveAction::HrReject | LeaveAction::Cancel => {
            LedgerEffect::Release
        }
        LeaveAction::HrApprove => LedgerEffect::Consume,
    }
}

pub fn audit_action(action: LeaveAction) -> AuditAction {
    match action {
        LeaveAction::ManagerApprove => AuditAction::ManagerApproval,
        LeaveAction::ManagerReject => AuditAction::ManagerRejection,
        LeaveAction::HrApprove => AuditAction::HrApproval,
        LeaveAction::HrReject => AuditAction::HrRejection,
        LeaveAction::Cancel => AuditAction::Cancellation,
    }
}

pub fn event_type(action: LeaveAction) -> LeaveEventType {
    match action {
        LeaveAction::ManagerApprove => LeaveEventType::ManagerApproved,
        LeaveAction::ManagerReject => LeaveEventType::ManagerRejected,
        LeaveAction::HrApprove => LeaveEventType::HrApproved,
        LeaveAction::HrReject => LeaveEventType::HrRejected,
        LeaveAction::Cancel => LeaveEventType::RequestCancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [LeaveAction; 5] = [
        LeaveAction::ManagerApprove,
        LeaveAction::ManagerReject,
        LeaveAction::HrApprove,
        LeaveAction::HrReject,
        LeaveAction::Cancel,
    ];

    #[test]
    fn success_path() {
        assert_eq!(
            next_status(LeaveStatus::Pending, LeaveAction::ManagerApprove),
            Some(LeaveStatus::ManagerApproved)
        );
        assert_eq!(
            next_status(LeaveStatus::ManagerApproved, LeaveAction::HrApprove),
            Some(LeaveStatus::HrApproved)
        );
    }

    #[test]
    fn hr_cannot_act_on_pending() {
        assert_eq!(next_status(LeaveStatus::Pending, LeaveAction::HrApprove), None);
        assert_eq!(next_status(LeaveStatus::Pending, LeaveAction::HrReject), None);
    }

    #[test]
    fn manager_cannot_act_after_own_decision() {
        assert_eq!(
            next_status(LeaveStatus::ManagerApproved, LeaveAction::ManagerApprove),
            None
        );
        assert_eq!(
            next_status(LeaveStatus::ManagerApproved, LeaveAction::ManagerReject),
            None
        );
    }

    #[test]
    fn cancel_allowed_until_hr_decides() {
        assert_eq!(
            next_status(LeaveStatus::Pending, LeaveAction::Cancel),
            Some(LeaveStatus::Cancelled)
        );
        assert_eq!(
            next_status(LeaveStatus::ManagerApproved, LeaveAction::Cancel),
            Some(LeaveStatus::Cancelled)
        );
    }

    #[test]
    fn terminal_states_admit_no_action() {
        for status in [
            LeaveStatus::ManagerRejected,
            LeaveStatus::HrApproved,
            LeaveStatus::HrRejected,
            LeaveStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
            for action in ALL_ACTIONS {
                assert_eq!(next_status(status, action), None);
            }
        }
    }

    #[test]
    fn only_hr_approval_consumes() {
        assert_eq!(ledger_effect(LeaveAction::HrApprove), LedgerEffect::Consume);
        assert_eq!(ledger_effect(LeaveAction::ManagerApprove), LedgerEffect::Keep);
        for action in [
            LeaveAction::ManagerReject,
            LeaveAction::HrReject,
            LeaveAction::Cancel,
        ] {
            assert_eq!(ledger_effect(action), LedgerEffect::Release);
        }
    }
}
