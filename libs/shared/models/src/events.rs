use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::appointment::{Actor, AppointmentStatus};

/// Fire-and-forget event handed to the notification collaborator. Delivery
/// failure never rolls back the scheduling decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub appointment_id: Uuid,
    pub kind: NotificationKind,
    pub recipient: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Booked,
    Rescheduled,
    Cancelled,
}

/// Structured event for the audit sink. The engine reports these and moves
/// on; it never depends on the sink succeeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub occurred_at: DateTime<Utc>,
    pub action: AuditAction,
    pub appointment_id: Option<Uuid>,
    pub practitioner_id: Option<Uuid>,
    pub actor: Option<Actor>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    Booked,
    Rescheduled,
    StatusChanged {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    LockAcquired,
    LockConflict,
    LockReleased,
    LockExpiredAtCommit,
    SeriesExpanded,
    CascadeApplied,
}
