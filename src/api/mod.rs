pub mod balance;
pub mod leave;

use actix_web::HttpResponse;
use serde_json::json;

use crate::engine::error::EngineError;

/// One place that turns engine rejections into HTTP responses, so every
/// endpoint reports domain failures the same way.
pub(crate) fn engine_error_response(err: EngineError) -> HttpResponse {
    match err {
        EngineError::Validation(e) => HttpResponse::BadRequest().json(json!({
            "message": e.to_string()
        })),
        EngineError::InsufficientBalance {
            requested,
            available,
        } => HttpResponse::Conflict().json(json!({
            "message": "Insufficient leave balance",
            "requested": requested,
            "available": available
        })),
        EngineError::InvalidTransition { status, .. } => HttpResponse::Conflict().json(json!({
            "message": "Action not allowed in the current status",
            "status": status
        })),
        EngineError::Unauthorized { .. } => HttpResponse::Forbidden().json(json!({
            "message": "Not allowed to perform this action"
        })),
        EngineError::NotFound { entity, .. } => HttpResponse::NotFound().json(json!({
            "message": format!("{entity} not found")
        })),
        EngineError::Contended => HttpResponse::ServiceUnavailable().json(json!({
            "message": "The request is busy, please retry"
        })),
        EngineError::Store(e) => {
            tracing::error!(error = %e, "Store failure");
            HttpResponse::InternalServerError().json(json!({
                "message": "Internal Server Error"
            }))
        }
    }
}
