//! Persistence boundary of the lifecycle engine.
//!
//! The engine sees only these traits. Reads go through the per-entity
//! repositories; the two composite write operations commit a whole
//! submission or transition (request rows + ledger adjustment + audit
//! rows) as a single unit, guarded by a compare-and-swap on the ledger
//! `version` and on the request `status`. A failed guard surfaces as
//! [`StoreError::Conflict`] and the engine re-reads and retries.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::leave_audit::{AuditAction, LeaveAudit};
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::{HalfDayPeriod, LeaveRequest, LeaveStatus};
use crate::model::leave_type::LeaveType;
use crate::model::user::User;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The guarded write lost a race with a concurrent mutator of the same
    /// row. Nothing was applied; the caller may re-read and retry.
    #[error("write conflicted with a concurrent update")]
    Conflict,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read-only reference data: users, leave categories, holiday calendar.
#[async_trait]
pub trait ReferenceRepository {
    async fn find_user(&self, id: u64) -> Result<Option<User>, StoreError>;
    async fn find_leave_type(&self, id: u64) -> Result<Option<LeaveType>, StoreError>;
    /// Holiday dates inside `start..=end`, for the day-count calculator.
    async fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub user_id: Option<u64>,
    pub status: Option<LeaveStatus>,
    /// 1-based page, taken together with `per_page`.
    pub page: u64,
    pub per_page: u64,
}

#[async_trait]
pub trait LeaveRequestRepository {
    async fn find_request(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError>;
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<LeaveRequest>, StoreError>;
    async fn count_requests(&self, filter: &RequestFilter) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait LedgerRepository {
    async fn find_balance(&self, key: &BalanceKey) -> Result<Option<LeaveBalance>, StoreError>;
    /// Returns the ledger row, creating it with `default_allocated` and zero
    /// usage on first reference.
    async fn load_or_create_balance(
        &self,
        key: &BalanceKey,
        default_allocated: f64,
    ) -> Result<LeaveBalance, StoreError>;
}

#[async_trait]
pub trait AuditRepository {
    /// History of one request, oldest first.
    async fn audit_trail(&self, leave_request_id: u64) -> Result<Vec<LeaveAudit>, StoreError>;
}

/// Request row to be created by a submission.
#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub user_id: u64,
    pub leave_type_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub half_day: bool,
    pub half_day_period: Option<HalfDayPeriod>,
    pub reason: Option<String>,
}

/// Audit row written in the same unit as its transition.
#[derive(Debug, Clone)]
pub struct NewAudit {
    pub action: AuditAction,
    pub performed_by: u64,
    pub previous_status: Option<LeaveStatus>,
    pub new_status: LeaveStatus,
    pub details: String,
}

/// Absolute new ledger quantities plus the version the caller read them
/// at. The write must fail with [`StoreError::Conflict`] when the row has
/// moved past `expected_version`.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    pub key: BalanceKey,
    pub expected_version: u64,
    pub used: f64,
    pub pending: f64,
}

/// One request of a submission batch together with its creation audit row.
#[derive(Debug, Clone)]
pub struct SubmissionItem {
    pub request: NewLeaveRequest,
    pub audit: NewAudit,
}

/// A whole submission batch: all requests, their audit rows and the single
/// ledger reservation, committed atomically or not at all.
#[derive(Debug, Clone)]
pub struct SubmissionWrite {
    pub items: Vec<SubmissionItem>,
    pub ledger: LedgerUpdate,
    pub at: DateTime<Utc>,
}

/// Which decision-maker slot a transition stamps.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StampSlot {
    Manager,
    Hr,
}

#[derive(Debug, Clone)]
pub struct ActorStamp {
    pub slot: StampSlot,
    pub actor_id: u64,
    pub comment: Option<String>,
}

/// One audited transition: status CAS, optional decision-maker stamp,
/// optional ledger adjustment and the audit row, committed atomically.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub request_id: u64,
    pub expected_status: LeaveStatus,
    pub new_status: LeaveStatus,
    pub stamp: Option<ActorStamp>,
    pub ledger: Option<LedgerUpdate>,
    pub audit: NewAudit,
    pub at: DateTime<Utc>,
}

/// The full persistence contract the engine is injected with.
#[async_trait]
pub trait LeaveStore:
    ReferenceRepository + LeaveRequestRepository + LedgerRepository + AuditRepository + Send + Sync
{
    async fn commit_submission(
        &self,
        write: SubmissionWrite,
    ) -> Result<Vec<LeaveRequest>, StoreError>;

    async fn commit_transition(&self, write: TransitionWrite) -> Result<LeaveRequest, StoreError>;
}
