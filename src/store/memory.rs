//! In-memory store, used by the test suite and by local development
//! without a database. One mutex over the whole dataset makes each
//! composite commit atomic; the version/status guards still apply, so the
//! engine's retry path behaves exactly as it does against MySQL.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::model::holiday::Holiday;
use crate::model::leave_audit::LeaveAudit;
use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_request::LeaveRequest;
use crate::model::leave_type::LeaveType;
use crate::model::user::User;

use super::{
    AuditRepository, LeaveRequestRepository, LeaveStore, LedgerRepository, ReferenceRepository,
    RequestFilter, StampSlot, StoreError, SubmissionWrite, TransitionWrite,
};

#[derive(Default)]
struct Inner {
    users: HashMap<u64, User>,
    leave_types: HashMap<u64, LeaveType>,
    holidays: Vec<Holiday>,
    requests: BTreeMap<u64, LeaveRequest>,
    balances: HashMap<BalanceKey, LeaveBalance>,
    audits: Vec<LeaveAudit>,
    next_request_id: u64,
    next_audit_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, user: User) {
        self.inner.lock().await.users.insert(user.id, user);
    }

    pub async fn seed_leave_type(&self, leave_type: LeaveType) {
        self.inner
            .lock()
            .await
            .leave_types
            .insert(leave_type.id, leave_type);
    }

    pub async fn seed_holiday(&self, holiday: Holiday) {
        self.inner.lock().await.holidays.push(holiday);
    }

    /// Install a ledger row as allocated at year start, replacing any lazy
    /// default.
    pub async fn seed_balance(&self, balance: LeaveBalance) {
        self.inner
            .lock()
            .await
            .balances
            .insert(balance.key(), balance);
    }
}

fn matches_filter(request: &LeaveRequest, filter: &RequestFilter) -> bool {
    if let Some(user_id) = filter.user_id {
        if request.user_id != user_id {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if request.status != status {
            return false;
        }
    }
    true
}

#[async_trait]
impl ReferenceRepository for MemoryStore {
    async fn find_user(&self, id: u64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_leave_type(&self, id: u64) -> Result<Option<LeaveType>, StoreError> {
        Ok(self.inner.lock().await.leave_types.get(&id).cloned())
    }

    async fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .holidays
            .iter()
            .filter(|h| h.date >= start && h.date <= end)
            .map(|h| h.date)
            .collect())
    }
}

#[async_trait]
impl LeaveRequestRepository for MemoryStore {
    async fn find_request(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.inner.lock().await.requests.get(&id).cloned())
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<LeaveRequest>, StoreError> {
        let inner = self.inner.lock().await;
        let per_page = filter.per_page.max(1) as usize;
        let offset = (filter.page.max(1) - 1) as usize * per_page;
        // Newest first, same ordering as the SQL store.
        Ok(inner
            .requests
            .values()
            .rev()
            .filter(|r| matches_filter(r, filter))
            .skip(offset)
            .take(per_page)
            .cloned()
            .collect())
    }

    async fn count_requests(&self, filter: &RequestFilter) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .requests
            .values()
            .filter(|r| matches_filter(r, filter))
            .count() as i64)
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn find_balance(&self, key: &BalanceKey) -> Result<Option<LeaveBalance>, StoreError> {
        Ok(self.inner.lock().await.balances.get(key).cloned())
    }

    async fn load_or_create_balance(
        &self,
        key: &BalanceKey,
        default_allocated: f64,
    ) -> Result<LeaveBalance, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .balances
            .entry(*key)
            .or_insert_with(|| LeaveBalance::new(*key, default_allocated))
            .clone())
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn audit_trail(&self, leave_request_id: u64) -> Result<Vec<LeaveAudit>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<LeaveAudit> = inner
            .audits
            .iter()
            .filter(|a| a.leave_request_id == leave_request_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.created_at, a.id));
        Ok(rows)
    }
}

#[async_trait]
impl LeaveStore for MemoryStore {
    async fn commit_submission(
        &self,
        write: SubmissionWrite,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let mut inner = self.inner.lock().await;

        let balance = inner
            .balances
            .get_mut(&write.ledger.key)
            .ok_or_else(|| StoreError::Backend("ledger row vanished".into()))?;
        if balance.version != write.ledger.expected_version {
            return Err(StoreError::Conflict);
        }
        balance.used = write.ledger.used;
        balance.pending = write.ledger.pending;
        balance.version += 1;

        let mut created = Vec::with_capacity(write.items.len());
        for item in write.items {
            inner.next_request_id += 1;
            let id = inner.next_request_id;
            let request = LeaveRequest {
                id,
                user_id: item.request.user_id,
                leave_type_id: item.request.leave_type_id,
                start_date: item.request.start_date,
                end_date: item.request.end_date,
                half_day: item.request.half_day,
                half_day_period: item.request.half_day_period,
                reason: item.request.reason,
                status: item.audit.new_status,
                manager_id: None,
                manager_comment: None,
                manager_action_at: None,
                hr_id: None,
                hr_comment: None,
                hr_action_at: None,
                created_at: write.at,
                updated_at: write.at,
            };
            inner.requests.insert(id, request.clone());

            inner.next_audit_id += 1;
            let audit_id = inner.next_audit_id;
            inner.audits.push(LeaveAudit {
                id: audit_id,
                leave_request_id: id,
                action: item.audit.action,
                performed_by: item.audit.performed_by,
                previous_status: item.audit.previous_status,
                new_status: item.audit.new_status,
                details: item.audit.details,
                created_at: write.at,
            });

            created.push(request);
        }

        Ok(created)
    }

    async fn commit_transition(&self, write: TransitionWrite) -> Result<LeaveRequest, StoreError> {
        let mut inner = self.inner.lock().await;

        // Both guards are checked before anything is touched, so a conflict
        // leaves the dataset untouched.
        {
            let request = inner
                .requests
                .get(&write.request_id)
                .ok_or(StoreError::Conflict)?;
            if request.status != write.expected_status {
                return Err(StoreError::Conflict);
            }
        }
        if let Some(ledger) = &write.ledger {
            let balance = inner
                .balances
                .get(&ledger.key)
                .ok_or_else(|| StoreError::Backend("ledger row vanished".into()))?;
            if balance.version != ledger.expected_version {
                return Err(StoreError::Conflict);
            }
        }

        if let Some(ledger) = &write.ledger {
            let balance = inner.balances.get_mut(&ledger.key).unwrap();
            balance.used = ledger.used;
            balance.pending = ledger.pending;
            balance.version += 1;
        }

        let request = inner.requests.get_mut(&write.request_id).unwrap();
        request.status = write.new_status;
        request.updated_at = write.at;
        if let Some(stamp) = &write.stamp {
            match stamp.slot {
                StampSlot::Manager => {
                    request.manager_id = Some(stamp.actor_id);
                    request.manager_comment = stamp.comment.clone();
                    request.manager_action_at = Some(write.at);
                }
                StampSlot::Hr => {
                    request.hr_id = Some(stamp.actor_id);
                    request.hr_comment = stamp.comment.clone();
                    request.hr_action_at = Some(write.at);
                }
            }
        }
        let updated = request.clone();

        inner.next_audit_id += 1;
        let audit_id = inner.next_audit_id;
        inner.audits.push(LeaveAudit {
            id: audit_id,
            leave_request_id: write.request_id,
            action: write.audit.action,
            performed_by: write.audit.performed_by,
            previous_status: write.audit.previous_status,
            new_status: write.audit.new_status,
            details: write.audit.details,
            created_at: write.at,
        });

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_audit::AuditAction;
    use crate::model::leave_request::LeaveStatus;
    use crate::store::{LedgerUpdate, NewAudit, NewLeaveRequest, SubmissionItem};
    use chrono::Utc;

    fn key() -> BalanceKey {
        BalanceKey {
            user_id: 1,
            leave_type_id: 1,
            year: 2026,
        }
    }

    fn submission(expected_version: u64, pending: f64) -> SubmissionWrite {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        SubmissionWrite {
            items: vec![SubmissionItem {
                request: NewLeaveRequest {
                    user_id: 1,
                    leave_type_id: 1,
                    start_date: day,
                    end_date: day,
                    half_day: false,
                    half_day_period: None,
                    reason: None,
                },
                audit: NewAudit {
                    action: AuditAction::LeaveRequestCreated,
                    performed_by: 1,
                    previous_status: None,
                    new_status: LeaveStatus::Pending,
                    details: "test".into(),
                },
            }],
            ledger: LedgerUpdate {
                key: key(),
                expected_version,
                used: 0.0,
                pending,
            },
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_side_effects() {
        let store = MemoryStore::new();
        store
            .seed_balance(LeaveBalance::new(key(), 10.0))
            .await;

        // First write moves the row to version 1.
        store.commit_submission(submission(0, 1.0)).await.unwrap();

        // A writer still holding version 0 must conflict.
        let err = store.commit_submission(submission(0, 2.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let balance = store.find_balance(&key()).await.unwrap().unwrap();
        assert_eq!(balance.pending, 1.0);
        assert_eq!(balance.version, 1);
        assert_eq!(store.count_requests(&RequestFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transition_status_guard_conflicts_on_mismatch() {
        let store = MemoryStore::new();
        store.seed_balance(LeaveBalance::new(key(), 10.0)).await;
        let created = store.commit_submission(submission(0, 1.0)).await.unwrap();

        let write = TransitionWrite {
            request_id: created[0].id,
            expected_status: LeaveStatus::ManagerApproved, // actually Pending
            new_status: LeaveStatus::HrApproved,
            stamp: None,
            ledger: None,
            audit: NewAudit {
                action: AuditAction::HrApproval,
                performed_by: 2,
                previous_status: Some(LeaveStatus::ManagerApproved),
                new_status: LeaveStatus::HrApproved,
                details: "test".into(),
            },
            at: Utc::now(),
        };
        let err = store.commit_transition(write).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let request = store.find_request(created[0].id).await.unwrap().unwrap();
        assert_eq!(request.status, LeaveStatus::Pending);
        assert_eq!(store.audit_trail(request.id).await.unwrap().len(), 1);
    }
}
