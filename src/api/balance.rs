use actix_web::{HttpResponse, Responder, web};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::engine::LeaveEngine;

use super::engine_error_response;

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct BalanceQuery {
    #[schema(example = 1)]
    pub leave_type_id: u64,
    /// Defaults to the current year
    #[schema(example = 2026)]
    pub year: Option<i32>,
    /// Another user's balance (managers/HR only)
    #[schema(example = 1000)]
    pub user_id: Option<u64>,
}

/* =========================
Current balance for (user, leave type, year)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/balance",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Ledger quantities", body = crate::engine::BalanceView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Balance"
)]
pub async fn get_balance(
    auth: AuthUser,
    engine: web::Data<LeaveEngine>,
    query: web::Query<BalanceQuery>,
) -> actix_web::Result<impl Responder> {
    let user_id = match query.user_id {
        Some(other) if other != auth.user_id => {
            auth.require_manager_or_hr()?;
            other
        }
        _ => auth.user_id,
    };
    let year = query.year.unwrap_or_else(|| Utc::now().year());

    match engine.get_balance(user_id, query.leave_type_id, year).await {
        Ok(view) => Ok(HttpResponse::Ok().json(view)),
        Err(e) => Ok(engine_error_response(e)),
    }
}
