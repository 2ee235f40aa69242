use thiserror::Error;

use crate::appointment::AppointmentStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Interval is already booked or held")]
    Conflict,

    #[error("Slot hold expired before booking commit")]
    LockExpired,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrenceRule(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SchedulingError {
    /// Conflict and lock expiry are expected under concurrent load; callers
    /// retry slot selection instead of failing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulingError::Conflict | SchedulingError::LockExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_errors_are_retryable() {
        assert!(SchedulingError::Conflict.is_retryable());
        assert!(SchedulingError::LockExpired.is_retryable());
        assert!(!SchedulingError::NotFound("practitioner".to_string()).is_retryable());
        assert!(!SchedulingError::InvalidTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Cancelled,
        }
        .is_retryable());
    }
}
