use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, AuditAction, AuditEvent, BookAppointment, CancelAppointment,
    NotificationEvent, NotificationKind, RescheduleAppointment, SchedulingError, StatusTransition,
    TimeSlot,
};
use shared_storage::{AppointmentStore, AuditSink, Clock, NotificationDispatcher};

use crate::models::BookingConfirmation;
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockManager;

/// Drives the commit half of the booking flow: verify the hold, re-check
/// conflicts against current state, write, release, notify.
pub struct BookingService {
    appointments: Arc<dyn AppointmentStore>,
    conflicts: Arc<ConflictDetectionService>,
    locks: Arc<SlotLockManager>,
    lifecycle: Arc<AppointmentLifecycleService>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        conflicts: Arc<ConflictDetectionService>,
        locks: Arc<SlotLockManager>,
        lifecycle: Arc<AppointmentLifecycleService>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            appointments,
            conflicts,
            locks,
            lifecycle,
            dispatcher,
            audit,
            clock,
        }
    }

    /// Commit a booking under a previously acquired hold. A failed hold
    /// verification is `LockExpired`, not a generic failure; the caller
    /// retries slot selection.
    pub async fn book(
        &self,
        command: BookAppointment,
    ) -> Result<BookingConfirmation, SchedulingError> {
        let slot = TimeSlot::from_start(command.start, command.duration_minutes);
        let now = self.clock.now();

        let held = self
            .locks
            .verify(command.practitioner_id, slot, command.lock_id)
            .await?;
        if !held {
            self.audit
                .record(AuditEvent {
                    occurred_at: now,
                    action: AuditAction::LockExpiredAtCommit,
                    appointment_id: None,
                    practitioner_id: Some(command.practitioner_id),
                    actor: Some(command.actor),
                    detail: Some(command.lock_id.to_string()),
                })
                .await;
            return Err(SchedulingError::LockExpired);
        }

        // Final check against current persisted state, not anything read
        // earlier in the flow.
        let report = self
            .conflicts
            .check(command.practitioner_id, command.patient_id, slot, None)
            .await?;
        let patient_advisories = self.conflicts.ensure_bookable(report)?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            practitioner_id: command.practitioner_id,
            patient_id: command.patient_id,
            appointment_type_id: command.appointment_type_id,
            start: command.start,
            duration_minutes: command.duration_minutes,
            status: AppointmentStatus::Scheduled,
            confirmed_at: None,
            checked_in_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            no_show_at: None,
            last_actor: Some(command.actor),
            cancellation_reason: None,
            reschedule_reason: None,
            series_id: command.series_id,
            occurrence_index: command.occurrence_index,
            created_at: now,
            updated_at: now,
        };
        self.appointments.insert(appointment.clone()).await?;
        info!(
            "Booked appointment {} for practitioner {} at {}",
            appointment.id, appointment.practitioner_id, appointment.start
        );

        self.release_best_effort(command.lock_id).await;
        self.audit
            .record(AuditEvent {
                occurred_at: now,
                action: AuditAction::Booked,
                appointment_id: Some(appointment.id),
                practitioner_id: Some(appointment.practitioner_id),
                actor: Some(command.actor),
                detail: None,
            })
            .await;
        self.dispatcher
            .dispatch(NotificationEvent {
                appointment_id: appointment.id,
                kind: NotificationKind::Booked,
                recipient: appointment.patient_id,
            })
            .await;

        Ok(BookingConfirmation {
            appointment,
            patient_advisories,
        })
    }

    /// Claim a new interval for an existing appointment. Goes through the
    /// lock manager and conflict detector like a fresh booking; never a
    /// silent field edit.
    pub async fn reschedule(
        &self,
        command: RescheduleAppointment,
    ) -> Result<BookingConfirmation, SchedulingError> {
        let mut appointment = self
            .appointments
            .get(command.appointment_id)
            .await?
            .ok_or_else(|| {
                SchedulingError::NotFound(format!("appointment {}", command.appointment_id))
            })?;

        // Interval changes are only meaningful before care has started.
        if !matches!(
            appointment.status,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        ) {
            return Err(SchedulingError::InvalidTransition {
                from: appointment.status,
                to: appointment.status,
            });
        }

        let practitioner_id = command
            .new_practitioner_id
            .unwrap_or(appointment.practitioner_id);
        let duration_minutes = command
            .new_duration_minutes
            .unwrap_or(appointment.duration_minutes);
        let new_slot = TimeSlot::from_start(command.new_start, duration_minutes);

        let lock = self.locks.acquire(practitioner_id, new_slot, None).await?;

        let report = self
            .conflicts
            .check(
                practitioner_id,
                appointment.patient_id,
                new_slot,
                Some(appointment.id),
            )
            .await?;
        let patient_advisories = match self.conflicts.ensure_bookable(report) {
            Ok(advisories) => advisories,
            Err(e) => {
                self.release_best_effort(lock.lock_id).await;
                return Err(e);
            }
        };

        let now = self.clock.now();
        appointment.practitioner_id = practitioner_id;
        appointment.start = command.new_start;
        appointment.duration_minutes = duration_minutes;
        appointment.reschedule_reason = command.reason.clone();
        appointment.last_actor = Some(command.actor);
        appointment.updated_at = now;
        self.appointments.update(appointment.clone()).await?;
        info!(
            "Rescheduled appointment {} to {} (practitioner {})",
            appointment.id, appointment.start, practitioner_id
        );

        self.release_best_effort(lock.lock_id).await;
        self.audit
            .record(AuditEvent {
                occurred_at: now,
                action: AuditAction::Rescheduled,
                appointment_id: Some(appointment.id),
                practitioner_id: Some(practitioner_id),
                actor: Some(command.actor),
                detail: command.reason,
            })
            .await;
        self.dispatcher
            .dispatch(NotificationEvent {
                appointment_id: appointment.id,
                kind: NotificationKind::Rescheduled,
                recipient: appointment.patient_id,
            })
            .await;

        Ok(BookingConfirmation {
            appointment,
            patient_advisories,
        })
    }

    pub async fn cancel(
        &self,
        command: CancelAppointment,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .lifecycle
            .apply(StatusTransition {
                appointment_id: command.appointment_id,
                to: AppointmentStatus::Cancelled,
                actor: command.actor,
                reason: Some(command.reason),
            })
            .await?;

        self.dispatcher
            .dispatch(NotificationEvent {
                appointment_id: appointment.id,
                kind: NotificationKind::Cancelled,
                recipient: appointment.patient_id,
            })
            .await;

        Ok(appointment)
    }

    /// Delivery of the hold back to storage is best-effort; an error here
    /// must not fail a commit that already happened.
    async fn release_best_effort(&self, lock_id: Uuid) {
        if let Err(e) = self.locks.release(lock_id).await {
            warn!("Failed to release slot hold {}: {}", lock_id, e);
        }
    }
}
