//! Leave lifecycle engine: validation, day counting, balance
//! reservation, state transitions, audit writing and event emission.
//!
//! The engine owns no persistence; it is injected with a [`LeaveStore`]
//! and a [`NotificationSink`]. Every mutating operation follows the same
//! shape: read, validate, build one composite write, commit it under the
//! store's optimistic guards, then emit the lifecycle event. A guard
//! conflict re-runs the whole read-validate-commit sequence, bounded by
//! `LeavePolicy::max_write_attempts`.

pub mod daycount;
pub mod error;
pub mod events;
pub mod policy;
pub mod transition;

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::model::leave_audit::{AuditAction, LeaveAudit};
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::{HalfDayPeriod, LeaveRequest, LeaveStatus};
use crate::store::{
    ActorStamp, LeaveStore, LedgerUpdate, NewAudit, NewLeaveRequest, StampSlot, StoreError,
    SubmissionItem, SubmissionWrite, TransitionWrite,
};

use error::{EngineError, ValidationError};
use events::{LeaveEvent, LeaveEventType, NotificationSink};
use transition::{LeaveAction, LedgerEffect};

/// Tunable policy knobs, sourced from configuration.
#[derive(Debug, Clone)]
pub struct LeavePolicy {
    /// Allocation granted when a ledger row is lazily created on first
    /// reference.
    pub default_allocation: f64,
    /// Whether the day counter skips public holidays. Off by default:
    /// the stock policy counts them.
    pub exclude_holidays: bool,
    /// Optimistic-write retry budget per operation.
    pub max_write_attempts: u32,
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Self {
            default_allocation: 20.0,
            exclude_holidays: false,
            max_write_attempts: 3,
        }
    }
}

/// One requested leave span within a submission batch.
#[derive(Debug, Clone)]
pub struct LeaveSpan {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub half_day: bool,
    pub half_day_period: Option<HalfDayPeriod>,
}

/// A submission: one or more spans drawing on the same leave type and
/// ledger year. Reserved against the ledger as one aggregate; either all
/// requests are created or none.
#[derive(Debug, Clone)]
pub struct SubmitLeave {
    pub user_id: u64,
    pub leave_type_id: u64,
    pub spans: Vec<LeaveSpan>,
    pub reason: Option<String>,
}

impl SubmitLeave {
    /// Build a batch of single-day spans from parallel `dates` and
    /// `half_day_flags` arrays, the shape the transport layer submits.
    pub fn from_dates(
        user_id: u64,
        leave_type_id: u64,
        dates: Vec<NaiveDate>,
        half_day_flags: Vec<bool>,
        reason: Option<String>,
    ) -> Result<Self, ValidationError> {
        if dates.len() != half_day_flags.len() {
            return Err(ValidationError::BatchShapeMismatch {
                dates: dates.len(),
                flags: half_day_flags.len(),
            });
        }
        let spans = dates
            .into_iter()
            .zip(half_day_flags)
            .map(|(date, half_day)| LeaveSpan {
                start_date: date,
                end_date: date,
                half_day,
                half_day_period: half_day.then_some(HalfDayPeriod::FirstHalf),
            })
            .collect();
        Ok(Self {
            user_id,
            leave_type_id,
            spans,
            reason,
        })
    }
}

/// Snapshot returned by [`LeaveEngine::get_balance`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceView {
    pub allocated: f64,
    pub used: f64,
    pub pending: f64,
    pub available: f64,
}

impl From<&LeaveBalance> for BalanceView {
    fn from(balance: &LeaveBalance) -> Self {
        Self {
            allocated: balance.allocated,
            used: balance.used,
            pending: balance.pending,
            available: balance.available(),
        }
    }
}

pub struct LeaveEngine {
    store: Arc<dyn LeaveStore>,
    notifier: Arc<dyn NotificationSink>,
    policy: LeavePolicy,
}

impl LeaveEngine {
    pub fn new(
        store: Arc<dyn LeaveStore>,
        notifier: Arc<dyn NotificationSink>,
        policy: LeavePolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn LeaveStore> {
        &self.store
    }

    /// Validate a batch, reserve its total against the ledger and create
    /// every request, all-or-nothing.
    pub async fn submit(&self, submit: SubmitLeave) -> Result<Vec<LeaveRequest>, EngineError> {
        if submit.spans.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let user = self
            .store
            .find_user(submit.user_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "user",
                id: submit.user_id,
            })?;

        let leave_type = self
            .store
            .find_leave_type(submit.leave_type_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "leave type",
                id: submit.leave_type_id,
            })?;
        if !leave_type.active {
            return Err(ValidationError::InactiveLeaveType(leave_type.id).into());
        }

        for span in &submit.spans {
            if span.start_date > span.end_date {
                return Err(ValidationError::StartAfterEnd {
                    start: span.start_date,
                    end: span.end_date,
                }
                .into());
            }
            if span.half_day && span.start_date != span.end_date {
                return Err(ValidationError::HalfDaySpan.into());
            }
        }

        // One submission draws on exactly one ledger row.
        let year = submit.spans[0].start_date.year();
        if submit.spans.iter().any(|s| s.start_date.year() != year) {
            return Err(ValidationError::MixedYears.into());
        }

        let holidays = self.applicable_holidays(&submit.spans).await?;
        let mut units = Vec::with_capacity(submit.spans.len());
        for span in &submit.spans {
            let n = daycount::compute_units(span.start_date, span.end_date, span.half_day, &holidays);
            if n == 0.0 {
                return Err(ValidationError::NoWorkingDays {
                    start: span.start_date,
                    end: span.end_date,
                }
                .into());
            }
            units.push(n);
        }
        let total: f64 = units.iter().sum();

        let key = BalanceKey {
            user_id: user.id,
            leave_type_id: leave_type.id,
            year,
        };

        for _ in 0..self.policy.max_write_attempts {
            let balance = self
                .store
                .load_or_create_balance(&key, self.policy.default_allocation)
                .await?;
            if total > balance.available() {
                return Err(EngineError::InsufficientBalance {
                    requested: total,
                    available: balance.available(),
                });
            }

            let items = submit
                .spans
                .iter()
                .zip(&units)
                .map(|(span, n)| SubmissionItem {
                    request: NewLeaveRequest {
                        user_id: user.id,
                        leave_type_id: leave_type.id,
                        start_date: span.start_date,
                        end_date: span.end_date,
                        half_day: span.half_day,
                        half_day_period: span.half_day_period,
                        reason: submit.reason.clone(),
                    },
                    audit: NewAudit {
                        action: AuditAction::LeaveRequestCreated,
                        performed_by: user.id,
                        previous_status: None,
                        new_status: LeaveStatus::Pending,
                        details: format!(
                            "{} day(s) of {} from {} to {}",
                            n, leave_type.name, span.start_date, span.end_date
                        ),
                    },
                })
                .collect();

            let write = SubmissionWrite {
                items,
                ledger: LedgerUpdate {
                    key,
                    expected_version: balance.version,
                    used: balance.used,
                    pending: balance.pending + total,
                },
                at: Utc::now(),
            };

            match self.store.commit_submission(write).await {
                Ok(created) => {
                    for request in &created {
                        self.emit(LeaveEventType::RequestSubmitted, request, vec![user.id])
                            .await;
                    }
                    return Ok(created);
                }
                Err(StoreError::Conflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngineError::Contended)
    }

    /// Manager stage: approve keeps the reservation, reject releases it.
    pub async fn manager_decide(
        &self,
        request_id: u64,
        actor_id: u64,
        approve: bool,
        comment: Option<String>,
    ) -> Result<LeaveRequest, EngineError> {
        let action = if approve {
            LeaveAction::ManagerApprove
        } else {
            LeaveAction::ManagerReject
        };
        self.transition(request_id, actor_id, action, comment).await
    }

    /// HR stage: approve converts the reservation into consumption,
    /// reject releases it.
    pub async fn hr_decide(
        &self,
        request_id: u64,
        actor_id: u64,
        approve: bool,
        comment: Option<String>,
    ) -> Result<LeaveRequest, EngineError> {
        let action = if approve {
            LeaveAction::HrApprove
        } else {
            LeaveAction::HrReject
        };
        self.transition(request_id, actor_id, action, comment).await
    }

    /// Requester withdraws; legal until HR has decided.
    pub async fn cancel(
        &self,
        request_id: u64,
        actor_id: u64,
    ) -> Result<LeaveRequest, EngineError> {
        self.transition(request_id, actor_id, LeaveAction::Cancel, None)
            .await
    }

    /// Current ledger quantities for (user, leave type, year). A row that
    /// has never been touched reports the lazy-creation default without
    /// persisting anything.
    pub async fn get_balance(
        &self,
        user_id: u64,
        leave_type_id: u64,
        year: i32,
    ) -> Result<BalanceView, EngineError> {
        let key = BalanceKey {
            user_id,
            leave_type_id,
            year,
        };
        match self.store.find_balance(&key).await? {
            Some(balance) => Ok(BalanceView::from(&balance)),
            None => Ok(BalanceView {
                allocated: self.policy.default_allocation,
                used: 0.0,
                pending: 0.0,
                available: self.policy.default_allocation,
            }),
        }
    }

    /// Full transition history of one request, oldest first.
    pub async fn audit_trail(&self, request_id: u64) -> Result<Vec<LeaveAudit>, EngineError> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "leave request",
                id: request_id,
            })?;
        Ok(self.store.audit_trail(request_id).await?)
    }

    async fn transition(
        &self,
        request_id: u64,
        actor_id: u64,
        action: LeaveAction,
        comment: Option<String>,
    ) -> Result<LeaveRequest, EngineError> {
        let actor = self
            .store
            .find_user(actor_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "user",
                id: actor_id,
            })?;

        for _ in 0..self.policy.max_write_attempts {
            let request = self
                .store
                .find_request(request_id)
                .await?
                .ok_or(EngineError::NotFound {
                    entity: "leave request",
                    id: request_id,
                })?;

            let new_status = transition::next_status(request.status, action).ok_or(
                EngineError::InvalidTransition {
                    status: request.status,
                    action,
                },
            )?;
            if !policy::can_perform(&actor, &request, action) {
                return Err(EngineError::Unauthorized {
                    actor_id,
                    request_id,
                    action,
                });
            }

            let ledger = self.ledger_update_for(&request, action).await?;
            let stamp = match action {
                LeaveAction::ManagerApprove | LeaveAction::ManagerReject => Some(ActorStamp {
                    slot: StampSlot::Manager,
                    actor_id,
                    comment: comment.clone(),
                }),
                LeaveAction::HrApprove | LeaveAction::HrReject => Some(ActorStamp {
                    slot: StampSlot::Hr,
                    actor_id,
                    comment: comment.clone(),
                }),
                LeaveAction::Cancel => None,
            };

            let write = TransitionWrite {
                request_id,
                expected_status: request.status,
                new_status,
                stamp,
                ledger,
                audit: NewAudit {
                    action: transition::audit_action(action),
                    performed_by: actor_id,
                    previous_status: Some(request.status),
                    new_status,
                    details: comment.clone().unwrap_or_else(|| action.to_string()),
                },
                at: Utc::now(),
            };

            match self.store.commit_transition(write).await {
                Ok(updated) => {
                    let mut relevant = vec![updated.user_id];
                    if actor_id != updated.user_id {
                        relevant.push(actor_id);
                    }
                    self.emit(transition::event_type(action), &updated, relevant)
                        .await;
                    return Ok(updated);
                }
                // Someone moved the request or the ledger underneath us;
                // re-read and re-validate from scratch.
                Err(StoreError::Conflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngineError::Contended)
    }

    /// Build the CAS-guarded ledger adjustment a transition carries, or
    /// None when the reservation simply stays in place.
    async fn ledger_update_for(
        &self,
        request: &LeaveRequest,
        action: LeaveAction,
    ) -> Result<Option<LedgerUpdate>, EngineError> {
        let effect = transition::ledger_effect(action);
        if effect == LedgerEffect::Keep {
            return Ok(None);
        }

        let holidays = if self.policy.exclude_holidays {
            self.store
                .holidays_between(request.start_date, request.end_date)
                .await?
        } else {
            Vec::new()
        };
        let units = daycount::compute_units(
            request.start_date,
            request.end_date,
            request.half_day,
            &holidays,
        );

        let key = BalanceKey {
            user_id: request.user_id,
            leave_type_id: request.leave_type_id,
            year: request.year(),
        };
        let balance = self.store.find_balance(&key).await?.ok_or_else(|| {
            StoreError::Backend(format!(
                "no ledger row for user {} leave type {} year {}",
                key.user_id, key.leave_type_id, key.year
            ))
        })?;

        let (used, pending) = match effect {
            LedgerEffect::Keep => unreachable!(),
            LedgerEffect::Release => (balance.used, balance.pending - units),
            LedgerEffect::Consume => (balance.used + units, balance.pending - units),
        };

        Ok(Some(LedgerUpdate {
            key,
            expected_version: balance.version,
            used,
            pending,
        }))
    }

    /// Holiday dates covering a non-empty batch, or nothing when the
    /// policy counts holidays as consumable days.
    async fn applicable_holidays(
        &self,
        spans: &[LeaveSpan],
    ) -> Result<Vec<NaiveDate>, EngineError> {
        if !self.policy.exclude_holidays {
            return Ok(Vec::new());
        }
        let (start, end) = spans.iter().fold(
            (spans[0].start_date, spans[0].end_date),
            |(lo, hi), s| (lo.min(s.start_date), hi.max(s.end_date)),
        );
        Ok(self.store.holidays_between(start, end).await?)
    }

    async fn emit(&self, event_type: LeaveEventType, request: &LeaveRequest, relevant: Vec<u64>) {
        let event = LeaveEvent {
            event_type,
            request: request.clone(),
            relevant_users: relevant,
        };
        // Fire-and-forget: the transition has committed, delivery trouble
        // is logged and swallowed.
        if let Err(e) = self.notifier.notify(event).await {
            warn!(error = %e, event = %event_type, "notification dispatch failed");
        }
    }
}
