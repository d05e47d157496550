use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Two-stage approval pipeline: a request needs a manager decision first,
/// then an HR decision. `ManagerRejected`, `HrRejected`, `HrApproved` and
/// `Cancelled` are terminal.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    ManagerApproved,
    ManagerRejected,
    HrApproved,
    HrRejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeaveStatus::ManagerRejected
                | LeaveStatus::HrRejected
                | LeaveStatus::HrApproved
                | LeaveStatus::Cancelled
        )
    }
}

/// Which half of the day a half-day request covers.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HalfDayPeriod {
    FirstHalf,
    SecondHalf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: u64,
    pub user_id: u64,
    pub leave_type_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub half_day: bool,
    pub half_day_period: Option<HalfDayPeriod>,
    pub reason: Option<String>,
    pub status: LeaveStatus,
    pub manager_id: Option<u64>,
    pub manager_comment: Option<String>,
    pub manager_action_at: Option<DateTime<Utc>>,
    pub hr_id: Option<u64>,
    pub hr_comment: Option<String>,
    pub hr_action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// The ledger year a request draws its balance from.
    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        self.start_date.year()
    }
}
