//! MySQL-backed store. Composite writes run inside one transaction; the
//! ledger CAS is an `UPDATE ... WHERE version = ?` and the request CAS an
//! `UPDATE ... WHERE status = ?`, with `rows_affected == 0` reported as
//! [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::mysql::MySqlQueryResult;
use sqlx::{FromRow, MySql, MySqlPool, Transaction};
use std::str::FromStr;

use crate::model::leave_balance::{BalanceKey, LeaveBalance};
use crate::model::leave_audit::{AuditAction, LeaveAudit};
use crate::model::leave_request::{HalfDayPeriod, LeaveRequest, LeaveStatus};
use crate::model::leave_type::LeaveType;
use crate::model::role::Role;
use crate::model::user::User;

use super::{
    AuditRepository, LeaveRequestRepository, LeaveStore, LedgerRepository, LedgerUpdate,
    ReferenceRepository, RequestFilter, StampSlot, StoreError, SubmissionWrite, TransitionWrite,
};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

// Helper enum for typed SQLx binding of dynamic filters
enum FilterValue {
    U64(u64),
    Str(String),
}

fn filter_clause(filter: &RequestFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    if let Some(user_id) = filter.user_id {
        where_sql.push_str(" AND user_id = ?");
        args.push(FilterValue::U64(user_id));
    }
    if let Some(status) = filter.status {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }

    (where_sql, args)
}

#[derive(FromRow)]
struct UserRow {
    id: u64,
    username: String,
    password: String,
    role_id: u8,
    is_active: bool,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, StoreError> {
        let role = Role::from_id(row.role_id)
            .ok_or_else(|| StoreError::Backend(format!("unknown role id {}", row.role_id)))?;
        Ok(User {
            id: row.id,
            username: row.username,
            password: row.password,
            role,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct LeaveRequestRow {
    id: u64,
    user_id: u64,
    leave_type_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    half_day: bool,
    half_day_period: Option<String>,
    reason: Option<String>,
    status: String,
    manager_id: Option<u64>,
    manager_comment: Option<String>,
    manager_action_at: Option<DateTime<Utc>>,
    hr_id: Option<u64>,
    hr_comment: Option<String>,
    hr_action_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LeaveRequestRow> for LeaveRequest {
    type Error = StoreError;

    fn try_from(row: LeaveRequestRow) -> Result<Self, StoreError> {
        let status = LeaveStatus::from_str(&row.status)
            .map_err(|_| StoreError::Backend(format!("unknown status '{}'", row.status)))?;
        let half_day_period = row
            .half_day_period
            .as_deref()
            .map(HalfDayPeriod::from_str)
            .transpose()
            .map_err(|_| StoreError::Backend("unknown half-day period".into()))?;
        Ok(LeaveRequest {
            id: row.id,
            user_id: row.user_id,
            leave_type_id: row.leave_type_id,
            start_date: row.start_date,
            end_date: row.end_date,
            half_day: row.half_day,
            half_day_period,
            reason: row.reason,
            status,
            manager_id: row.manager_id,
            manager_comment: row.manager_comment,
            manager_action_at: row.manager_action_at,
            hr_id: row.hr_id,
            hr_comment: row.hr_comment,
            hr_action_at: row.hr_action_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LeaveAuditRow {
    id: u64,
    leave_request_id: u64,
    action: String,
    performed_by: u64,
    previous_status: Option<String>,
    new_status: String,
    details: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeaveAuditRow> for LeaveAudit {
    type Error = StoreError;

    fn try_from(row: LeaveAuditRow) -> Result<Self, StoreError> {
        let action = AuditAction::from_str(&row.action)
            .map_err(|_| StoreError::Backend(format!("unknown audit action '{}'", row.action)))?;
        let previous_status = row
            .previous_status
            .as_deref()
            .map(LeaveStatus::from_str)
            .transpose()
            .map_err(|_| StoreError::Backend("unknown audit status".into()))?;
        let new_status = LeaveStatus::from_str(&row.new_status)
            .map_err(|_| StoreError::Backend("unknown audit status".into()))?;
        Ok(LeaveAudit {
            id: row.id,
            leave_request_id: row.leave_request_id,
            action,
            performed_by: row.performed_by,
            previous_status,
            new_status,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct LeaveBalanceRow {
    user_id: u64,
    leave_type_id: u64,
    year: i32,
    allocated: f64,
    used: f64,
    pending: f64,
    version: u64,
}

impl From<LeaveBalanceRow> for LeaveBalance {
    fn from(row: LeaveBalanceRow) -> Self {
        LeaveBalance {
            user_id: row.user_id,
            leave_type_id: row.leave_type_id,
            year: row.year,
            allocated: row.allocated,
            used: row.used,
            pending: row.pending,
            version: row.version,
        }
    }
}

const REQUEST_COLUMNS: &str = "id, user_id, leave_type_id, start_date, end_date, half_day, \
     half_day_period, reason, status, manager_id, manager_comment, manager_action_at, \
     hr_id, hr_comment, hr_action_at, created_at, updated_at";

/// Apply a ledger update inside `tx`; Conflict when the version moved.
async fn apply_ledger_update(
    tx: &mut Transaction<'_, MySql>,
    ledger: &LedgerUpdate,
) -> Result<(), StoreError> {
    let result: MySqlQueryResult = sqlx::query(
        r#"
        UPDATE leave_balances
        SET used = ?, pending = ?, version = version + 1
        WHERE user_id = ? AND leave_type_id = ? AND year = ? AND version = ?
        "#,
    )
    .bind(ledger.used)
    .bind(ledger.pending)
    .bind(ledger.key.user_id)
    .bind(ledger.key.leave_type_id)
    .bind(ledger.key.year)
    .bind(ledger.expected_version)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict);
    }
    Ok(())
}

async fn insert_audit(
    tx: &mut Transaction<'_, MySql>,
    leave_request_id: u64,
    audit: &super::NewAudit,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO leave_audits
            (leave_request_id, action, performed_by, previous_status, new_status, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(leave_request_id)
    .bind(audit.action.to_string())
    .bind(audit.performed_by)
    .bind(audit.previous_status.map(|s| s.to_string()))
    .bind(audit.new_status.to_string())
    .bind(&audit.details)
    .bind(at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ReferenceRepository for MySqlStore {
    async fn find_user(&self, id: u64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password, role_id, is_active FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_leave_type(&self, id: u64) -> Result<Option<LeaveType>, StoreError> {
        #[derive(FromRow)]
        struct Row {
            id: u64,
            name: String,
            active: bool,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT id, name, active FROM leave_types WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| LeaveType {
            id: r.id,
            name: r.name,
            active: r.active,
        }))
    }

    async fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT date FROM holidays WHERE date BETWEEN ? AND ? ORDER BY date",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(dates)
    }
}

#[async_trait]
impl LeaveRequestRepository for MySqlStore {
    async fn find_request(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM leave_requests WHERE id = ?");
        let row = sqlx::query_as::<_, LeaveRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(LeaveRequest::try_from).transpose()
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<LeaveRequest>, StoreError> {
        let (where_sql, args) = filter_clause(filter);
        let per_page = filter.per_page.max(1);
        let offset = (filter.page.max(1) - 1) * per_page;

        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM leave_requests{where_sql} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query_as::<_, LeaveRequestRow>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::Str(s) => query.bind(s),
            };
        }
        let rows = query
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(LeaveRequest::try_from).collect()
    }

    async fn count_requests(&self, filter: &RequestFilter) -> Result<i64, StoreError> {
        let (where_sql, args) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM leave_requests{where_sql}");
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::Str(s) => query.bind(s),
            };
        }
        Ok(query.fetch_one(&self.pool).await?)
    }
}

#[async_trait]
impl LedgerRepository for MySqlStore {
    async fn find_balance(&self, key: &BalanceKey) -> Result<Option<LeaveBalance>, StoreError> {
        let row = sqlx::query_as::<_, LeaveBalanceRow>(
            r#"
            SELECT user_id, leave_type_id, year, allocated, used, pending, version
            FROM leave_balances
            WHERE user_id = ? AND leave_type_id = ? AND year = ?
            "#,
        )
        .bind(key.user_id)
        .bind(key.leave_type_id)
        .bind(key.year)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(LeaveBalance::from))
    }

    async fn load_or_create_balance(
        &self,
        key: &BalanceKey,
        default_allocated: f64,
    ) -> Result<LeaveBalance, StoreError> {
        // INSERT IGNORE keeps concurrent first references race-free; the
        // unique key on (user_id, leave_type_id, year) arbitrates.
        sqlx::query(
            r#"
            INSERT IGNORE INTO leave_balances
                (user_id, leave_type_id, year, allocated, used, pending, version)
            VALUES (?, ?, ?, ?, 0, 0, 0)
            "#,
        )
        .bind(key.user_id)
        .bind(key.leave_type_id)
        .bind(key.year)
        .bind(default_allocated)
        .execute(&self.pool)
        .await?;

        self.find_balance(key)
            .await?
            .ok_or_else(|| StoreError::Backend("ledger row vanished after insert".into()))
    }
}

#[async_trait]
impl AuditRepository for MySqlStore {
    async fn audit_trail(&self, leave_request_id: u64) -> Result<Vec<LeaveAudit>, StoreError> {
        let rows = sqlx::query_as::<_, LeaveAuditRow>(
            r#"
            SELECT id, leave_request_id, action, performed_by, previous_status,
                   new_status, details, created_at
            FROM leave_audits
            WHERE leave_request_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(leave_request_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LeaveAudit::try_from).collect()
    }
}

#[async_trait]
impl LeaveStore for MySqlStore {
    async fn commit_submission(
        &self,
        write: SubmissionWrite,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let mut tx = self.pool.begin().await?;

        apply_ledger_update(&mut tx, &write.ledger).await?;

        let mut created = Vec::with_capacity(write.items.len());
        for item in &write.items {
            let result = sqlx::query(
                r#"
                INSERT INTO leave_requests
                    (user_id, leave_type_id, start_date, end_date, half_day,
                     half_day_period, reason, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(item.request.user_id)
            .bind(item.request.leave_type_id)
            .bind(item.request.start_date)
            .bind(item.request.end_date)
            .bind(item.request.half_day)
            .bind(item.request.half_day_period.map(|p| p.to_string()))
            .bind(&item.request.reason)
            .bind(item.audit.new_status.to_string())
            .bind(write.at)
            .bind(write.at)
            .execute(&mut *tx)
            .await?;
            let id = result.last_insert_id();

            insert_audit(&mut tx, id, &item.audit, write.at).await?;

            created.push(LeaveRequest {
                id,
                user_id: item.request.user_id,
                leave_type_id: item.request.leave_type_id,
                start_date: item.request.start_date,
                end_date: item.request.end_date,
                half_day: item.request.half_day,
                half_day_period: item.request.half_day_period,
                reason: item.request.reason.clone(),
                status: item.audit.new_status,
                manager_id: None,
                manager_comment: None,
                manager_action_at: None,
                hr_id: None,
                hr_comment: None,
                hr_action_at: None,
                created_at: write.at,
                updated_at: write.at,
            });
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn commit_transition(&self, write: TransitionWrite) -> Result<LeaveRequest, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = match &write.stamp {
            Some(stamp) => {
                let (id_col, comment_col, at_col) = match stamp.slot {
                    StampSlot::Manager => ("manager_id", "manager_comment", "manager_action_at"),
                    StampSlot::Hr => ("hr_id", "hr_comment", "hr_action_at"),
                };
                let sql = format!(
                    "UPDATE leave_requests \
                     SET status = ?, {id_col} = ?, {comment_col} = ?, {at_col} = ?, updated_at = ? \
                     WHERE id = ? AND status = ?"
                );
                sqlx::query(&sql)
                    .bind(write.new_status.to_string())
                    .bind(stamp.actor_id)
                    .bind(&stamp.comment)
                    .bind(write.at)
                    .bind(write.at)
                    .bind(write.request_id)
                    .bind(write.expected_status.to_string())
                    .execute(&mut *tx)
                    .await?
            }
            None => {
                sqlx::query(
                    "UPDATE leave_requests SET status = ?, updated_at = ? \
                     WHERE id = ? AND status = ?",
                )
                .bind(write.new_status.to_string())
                .bind(write.at)
                .bind(write.request_id)
                .bind(write.expected_status.to_string())
                .execute(&mut *tx)
                .await?
            }
        };
        if result.rows_affected() == 0 {
            // Row missing or already past `expected_status`; the engine
            // re-reads and classifies.
            return Err(StoreError::Conflict);
        }

        if let Some(ledger) = &write.ledger {
            apply_ledger_update(&mut tx, ledger).await?;
        }

        insert_audit(&mut tx, write.request_id, &write.audit, write.at).await?;

        let sql = format!("SELECT {REQUEST_COLUMNS} FROM leave_requests WHERE id = ?");
        let row = sqlx::query_as::<_, LeaveRequestRow>(&sql)
            .bind(write.request_id)
            .fetch_one(&mut *tx)
            .await?;
        let updated = LeaveRequest::try_from(row)?;

        tx.commit().await?;
        Ok(updated)
    }
}
