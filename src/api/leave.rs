use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::engine::{LeaveEngine, LeaveSpan, SubmitLeave};
use crate::model::leave_audit::LeaveAudit;
use crate::model::leave_request::{HalfDayPeriod, LeaveRequest, LeaveStatus};
use crate::store::{LeaveRequestRepository, RequestFilter};

use super::engine_error_response;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-03-06", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[serde(default)]
    #[schema(example = false)]
    pub half_day: bool,
    #[schema(example = "first_half", value_type = Option<String>)]
    pub half_day_period: Option<HalfDayPeriod>,
    #[schema(example = "Family trip")]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateLeaveBatch {
    #[schema(example = 1)]
    pub leave_type_id: u64,
    /// One single-day request is created per date.
    #[schema(example = json!(["2026-03-02", "2026-03-09"]), value_type = Vec<String>)]
    pub dates: Vec<NaiveDate>,
    /// Must have the same length as `dates`.
    #[schema(example = json!([false, true]))]
    pub half_day_flags: Vec<bool>,
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DecisionReq {
    #[schema(example = true)]
    pub approve: bool,
    #[schema(example = "Covered by the team")]
    pub comment: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveResponse {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-03-06", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub half_day: bool,
    #[schema(value_type = Option<String>)]
    pub half_day_period: Option<HalfDayPeriod>,
    pub reason: Option<String>,
    #[schema(example = "pending", value_type = String)]
    pub status: LeaveStatus,
    pub manager_id: Option<u64>,
    pub manager_comment: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub manager_action_at: Option<DateTime<Utc>>,
    pub hr_id: Option<u64>,
    pub hr_comment: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub hr_action_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl From<LeaveRequest> for LeaveResponse {
    fn from(r: LeaveRequest) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            leave_type_id: r.leave_type_id,
            start_date: r.start_date,
            end_date: r.end_date,
            half_day: r.half_day,
            half_day_period: r.half_day_period,
            reason: r.reason,
            status: r.status,
            manager_id: r.manager_id,
            manager_comment: r.manager_comment,
            manager_action_at: r.manager_action_at,
            hr_id: r.hr_id,
            hr_comment: r.hr_comment,
            hr_action_at: r.hr_action_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    #[schema(example = 123)]
    /// Filter by requester (managers/HR only)
    pub user_id: Option<u64>,
    #[schema(example = "pending", value_type = Option<String>)]
    /// Filter by leave status
    pub status: Option<LeaveStatus>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    #[schema(example = 10)]
    /// Pagination per page number
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveResponse>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AuditResponse {
    pub id: u64,
    pub leave_request_id: u64,
    #[schema(example = "LEAVE_REQUEST_CREATED", value_type = String)]
    pub action: String,
    pub performed_by: u64,
    #[schema(value_type = Option<String>)]
    pub previous_status: Option<LeaveStatus>,
    #[schema(example = "pending", value_type = String)]
    pub new_status: LeaveStatus,
    pub details: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl From<LeaveAudit> for AuditResponse {
    fn from(a: LeaveAudit) -> Self {
        Self {
            id: a.id,
            leave_request_id: a.leave_request_id,
            action: a.action.to_string(),
            performed_by: a.performed_by,
            previous_status: a.previous_status,
            new_status: a.new_status,
            details: a.details,
            created_at: a.created_at,
        }
    }
}

/* =========================
Submit a leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/leave",
    request_body = CreateLeave,
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Insufficient balance"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    payload: web::Json<CreateLeave>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let submit = SubmitLeave {
        user_id: auth.user_id,
        leave_type_id: payload.leave_type_id,
        spans: vec![LeaveSpan {
            start_date: payload.start_date,
            end_date: payload.end_date,
            half_day: payload.half_day,
            half_day_period: payload.half_day_period,
        }],
        reason: payload.reason,
    };

    match engine.submit(submit).await {
        Ok(mut created) => {
            // Single-span submission always creates exactly one request.
            let request = created.remove(0);
            Ok(HttpResponse::Created().json(LeaveResponse::from(request)))
        }
        Err(e) => Ok(engine_error_response(e)),
    }
}

/* =========================
Submit several single-day requests in one call
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/leave/batch",
    request_body = CreateLeaveBatch,
    responses(
        (status = 201, description = "All requests created", body = [LeaveResponse]),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Insufficient balance for the whole batch"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave_batch(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    payload: web::Json<CreateLeaveBatch>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let submit = match SubmitLeave::from_dates(
        auth.user_id,
        payload.leave_type_id,
        payload.dates,
        payload.half_day_flags,
        payload.reason,
    ) {
        Ok(s) => s,
        Err(e) => return Ok(engine_error_response(e.into())),
    };

    match engine.submit(submit).await {
        Ok(created) => Ok(HttpResponse::Created()
            .json(created.into_iter().map(LeaveResponse::from).collect::<Vec<_>>())),
        Err(e) => Ok(engine_error_response(e)),
    }
}

/* =========================
Manager decision
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/manager",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    request_body = DecisionReq,
    responses(
        (status = 200, description = "Decision recorded", body = LeaveResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Not decidable in the current status"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn manager_decide(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    path: web::Path<u64>,
    body: web::Json<DecisionReq>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();
    let body = body.into_inner();

    match engine
        .manager_decide(leave_id, auth.user_id, body.approve, body.comment)
        .await
    {
        Ok(updated) => Ok(HttpResponse::Ok().json(LeaveResponse::from(updated))),
        Err(e) => Ok(engine_error_response(e)),
    }
}

/* =========================
HR decision
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/hr",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    request_body = DecisionReq,
    responses(
        (status = 200, description = "Decision recorded", body = LeaveResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Not decidable in the current status"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn hr_decide(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    path: web::Path<u64>,
    body: web::Json<DecisionReq>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();
    let body = body.into_inner();

    match engine
        .hr_decide(leave_id, auth.user_id, body.approve, body.comment)
        .await
    {
        Ok(updated) => Ok(HttpResponse::Ok().json(LeaveResponse::from(updated))),
        Err(e) => Ok(engine_error_response(e)),
    }
}

/* =========================
Cancel own request
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/cancel",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Request cancelled", body = LeaveResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Not cancellable in the current status"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    match engine.cancel(leave_id, auth.user_id).await {
        Ok(updated) => Ok(HttpResponse::Ok().json(LeaveResponse::from(updated))),
        Err(e) => Ok(engine_error_response(e)),
    }
}

/* =========================
Fetch one leave request
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let request = match engine.store().find_request(leave_id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(serde_json::json!({
                "message": "Leave request not found"
            })));
        }
        Err(e) => {
            tracing::error!(error = %e, leave_id, "Failed to fetch leave request");
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    // Requesters see their own; managers and HR see everything.
    if request.user_id != auth.user_id {
        auth.require_manager_or_hr()?;
    }

    Ok(HttpResponse::Ok().json(LeaveResponse::from(request)))
}

/* =========================
List leave requests
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    let per_page = query.per_page.unwrap_or(10).min(100);
    let page = query.page.unwrap_or(1).max(1);

    // Employees only ever see their own requests.
    let user_id = if auth.require_manager_or_hr().is_ok() {
        query.user_id
    } else {
        Some(auth.user_id)
    };

    let filter = RequestFilter {
        user_id,
        status: query.status,
        page,
        per_page,
    };

    let store = engine.store();
    let (data, total) = match tokio::try_join!(
        store.list_requests(&filter),
        store.count_requests(&filter)
    ) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch leave list");
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data: data.into_iter().map(LeaveResponse::from).collect(),
        page,
        per_page,
        total,
    }))
}

/* =========================
Audit trail of one request
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}/audit",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Audit rows, oldest first", body = [AuditResponse]),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_audit(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    // Owners may inspect their own history, staff all of them.
    match engine.store().find_request(leave_id).await {
        Ok(Some(r)) if r.user_id != auth.user_id => auth.require_manager_or_hr()?,
        Ok(Some(_)) => {}
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(serde_json::json!({
                "message": "Leave request not found"
            })));
        }
        Err(e) => {
            tracing::error!(error = %e, leave_id, "Failed to fetch leave request");
            return Ok(HttpResponse::InternalServerError().finish());
        }
    }

    match engine.audit_trail(leave_id).await {
        Ok(rows) => Ok(HttpResponse::Ok()
            .json(rows.into_iter().map(AuditResponse::from).collect::<Vec<_>>())),
        Err(e) => Ok(engine_error_response(e)),
    }
}
