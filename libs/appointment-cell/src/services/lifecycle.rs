use std::sync::Arc;
use tracing::{debug, warn};

use shared_models::{
    Appointment, AppointmentStatus, AuditAction, AuditEvent, SchedulingError, StatusTransition,
    UpdateAppointmentType,
};
use shared_storage::{AppointmentStore, AuditSink, Clock};

/// Owns the appointment lifecycle. Transitions are monotonic, terminal states
/// are final, and each transition stamps its timestamp exactly once.
pub struct AppointmentLifecycleService {
    appointments: Arc<dyn AppointmentStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AppointmentLifecycleService {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            appointments,
            audit,
            clock,
        }
    }

    /// All valid next statuses for a given current status.
    pub fn valid_transitions(current: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::CheckedIn,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::CheckedIn => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states.
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_transition(
        from: &AppointmentStatus,
        to: &AppointmentStatus,
    ) -> Result<(), SchedulingError> {
        if !Self::valid_transitions(from).contains(to) {
            warn!("Invalid status transition attempted: {} -> {}", from, to);
            return Err(SchedulingError::InvalidTransition {
                from: *from,
                to: *to,
            });
        }
        Ok(())
    }

    /// Apply one transition command: validate, stamp the matching timestamp,
    /// record actor and reason, persist, report to the audit sink.
    pub async fn apply(&self, command: StatusTransition) -> Result<Appointment, SchedulingError> {
        let mut appointment = self
            .appointments
            .get(command.appointment_id)
            .await?
            .ok_or_else(|| {
                SchedulingError::NotFound(format!("appointment {}", command.appointment_id))
            })?;

        let from = appointment.status;
        Self::validate_transition(&from, &command.to)?;

        let now = self.clock.now();
        let stamp = match command.to {
            AppointmentStatus::Confirmed => &mut appointment.confirmed_at,
            AppointmentStatus::CheckedIn => &mut appointment.checked_in_at,
            AppointmentStatus::InProgress => &mut appointment.started_at,
            AppointmentStatus::Completed => &mut appointment.completed_at,
            AppointmentStatus::Cancelled => &mut appointment.cancelled_at,
            AppointmentStatus::NoShow => &mut appointment.no_show_at,
            AppointmentStatus::Scheduled => {
                // Scheduled is the creation state, never a transition target.
                return Err(SchedulingError::InvalidTransition {
                    from,
                    to: command.to,
                });
            }
        };
        if stamp.is_some() {
            return Err(SchedulingError::InvalidTransition {
                from,
                to: command.to,
            });
        }
        *stamp = Some(now);

        appointment.status = command.to;
        appointment.last_actor = Some(command.actor);
        if command.to == AppointmentStatus::Cancelled {
            appointment.cancellation_reason = command.reason.clone();
        }
        appointment.updated_at = now;

        self.appointments.update(appointment.clone()).await?;
        debug!(
            "Appointment {} transitioned {} -> {}",
            appointment.id, from, command.to
        );

        self.audit
            .record(AuditEvent {
                occurred_at: now,
                action: AuditAction::StatusChanged {
                    from,
                    to: command.to,
                },
                appointment_id: Some(appointment.id),
                practitioner_id: Some(appointment.practitioner_id),
                actor: Some(command.actor),
                detail: command.reason,
            })
            .await;

        Ok(appointment)
    }

    /// The one core-field edit that does not claim a new interval. Permitted
    /// only while scheduled or confirmed; anything later needs a reschedule.
    pub async fn update_type(
        &self,
        command: UpdateAppointmentType,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointment = self
            .appointments
            .get(command.appointment_id)
            .await?
            .ok_or_else(|| {
                SchedulingError::NotFound(format!("appointment {}", command.appointment_id))
            })?;

        if !matches!(
            appointment.status,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        ) {
            return Err(SchedulingError::InvalidTransition {
                from: appointment.status,
                to: appointment.status,
            });
        }

        appointment.appointment_type_id = command.appointment_type_id;
        appointment.last_actor = Some(command.actor);
        appointment.updated_at = self.clock.now();
        self.appointments.update(appointment.clone()).await?;
        Ok(appointment)
    }
}
