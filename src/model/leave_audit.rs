use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use super::leave_request::LeaveStatus;

/// What happened to a request, one value per transition kind.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    LeaveRequestCreated,
    ManagerApproval,
    ManagerRejection,
    HrApproval,
    HrRejection,
    Cancellation,
}

/// Append-only history row. One row is written per transition, in the same
/// atomic unit as the status and ledger writes; rows are never updated or
/// deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveAudit {
    pub id: u64,
    pub leave_request_id: u64,
    pub action: AuditAction,
    pub performed_by: u64,
    /// None only for the creation row.
    pub previous_status: Option<LeaveStatus>,
    pub new_status: LeaveStatus,
    pub details: String,
    pub created_at: DateTime<Utc>,
}
