use crate::api::balance::BalanceQuery;
use crate::api::leave::{
    AuditResponse, CreateLeave, CreateLeaveBatch, DecisionReq, LeaveFilter, LeaveListResponse,
    LeaveResponse,
};
use crate::engine::BalanceView;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Leave Management API",
        version = "1.0.0",
        description = r#"
## Leave Management System

This API administers employee leave requests through a **two-stage approval
pipeline** (manager, then HR) backed by a per-employee, per-leave-type,
per-year balance ledger.

### Key Features
- **Leave Requests**
  - Submit single spans or batches of single-day requests
  - Manager and HR approval/rejection with comments
  - Requester cancellation until HR decides
- **Balance Ledger**
  - Allocated / used / pending quantities, half-day aware
- **Audit Trail**
  - Append-only history of every transition

### Security
Endpoints are protected using **JWT Bearer authentication**.
Roles are flat: `hr`, `manager`, `employee`.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::leave::leave_list,
        crate::api::leave::get_leave,
        crate::api::leave::create_leave,
        crate::api::leave::create_leave_batch,
        crate::api::leave::manager_decide,
        crate::api::leave::hr_decide,
        crate::api::leave::cancel_leave,
        crate::api::leave::leave_audit,

        crate::api::balance::get_balance
    ),
    components(
        schemas(
            CreateLeave,
            CreateLeaveBatch,
            DecisionReq,
            LeaveFilter,
            LeaveResponse,
            LeaveListResponse,
            AuditResponse,
            BalanceQuery,
            BalanceView
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Leave", description = "Leave lifecycle APIs"),
        (name = "Balance", description = "Balance ledger APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
