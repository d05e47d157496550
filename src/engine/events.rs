use async_trait::async_trait;
use serde::Serialize;
use strum_macros::Display;
use tracing::info;

use crate::model::leave_request::LeaveRequest;

/// Lifecycle events, one per transition kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveEventType {
    RequestSubmitted,
    ManagerApproved,
    ManagerRejected,
    HrApproved,
    HrRejected,
    RequestCancelled,
}

/// Payload handed to the notification dispatcher after a transition has
/// committed.
#[derive(Debug, Clone, Serialize)]
pub struct LeaveEvent {
    pub event_type: LeaveEventType,
    pub request: LeaveRequest,
    pub relevant_users: Vec<u64>,
}

/// Delivery boundary. Implementations may mail, queue or log; the engine
/// calls this only after the transaction has committed and logs failures
/// instead of propagating them, so delivery can never undo a transition.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: LeaveEvent) -> anyhow::Result<()>;
}

/// Default sink: structured log lines only.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: LeaveEvent) -> anyhow::Result<()> {
        info!(
            event = %event.event_type,
            leave_request_id = event.request.id,
            user_id = event.request.user_id,
            "leave lifecycle event"
        );
        Ok(())
    }
}
