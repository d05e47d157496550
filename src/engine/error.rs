use chrono::NaiveDate;
use thiserror::Error;

use crate::model::leave_request::LeaveStatus;
use crate::store::StoreError;

use super::transition::LeaveAction;

/// Caller-fixable input problems. Reported as-is, never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a submission must contain at least one leave span")]
    EmptyBatch,
    #[error("got {dates} dates but {flags} half-day flags")]
    BatchShapeMismatch { dates: usize, flags: usize },
    #[error("start date {start} is after end date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
    #[error("a half-day request must start and end on the same date")]
    HalfDaySpan,
    #[error("the span {start} to {end} contains no working days")]
    NoWorkingDays { start: NaiveDate, end: NaiveDate },
    #[error("all spans in one submission must fall in the same year")]
    MixedYears,
    #[error("leave type {0} is not accepting new requests")]
    InactiveLeaveType(u64),
}

/// Everything a lifecycle operation can fail with.
///
/// Domain rejections (`InsufficientBalance`, `InvalidTransition`,
/// `Unauthorized`, `NotFound`, `Validation`) leave the ledger and the
/// request exactly as they were. `Contended` is the one transient
/// condition: the optimistic retry budget ran out and the end user may
/// simply try again.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("requested {requested} day(s) but only {available} available")]
    InsufficientBalance { requested: f64, available: f64 },
    #[error("cannot {action} a request that is {status}")]
    InvalidTransition {
        status: LeaveStatus,
        action: LeaveAction,
    },
    #[error("user {actor_id} may not {action} leave request {request_id}")]
    Unauthorized {
        actor_id: u64,
        request_id: u64,
        action: LeaveAction,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("the balance row is contended, please retry")]
    Contended,
    #[error(transparent)]
    Store(#[from] StoreError),
}
