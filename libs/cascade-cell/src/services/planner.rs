use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use appointment_cell::BookingService;
use availability_cell::{AvailabilityService, AvailableSlot, SlotGenerator, SlotQuery};
use shared_config::SchedulingPolicy;
use shared_models::{
    Actor, Appointment, AuditAction, AuditEvent, CancelAppointment, Leave, LeaveStatus,
    RescheduleAppointment, SchedulingError, TimeSlot,
};
use shared_storage::{
    AppointmentFilter, AppointmentStore, AuditSink, Clock, PractitionerDirectory, ScheduleStore,
};

use crate::models::{
    AffectedAppointment, CascadeChoice, CascadeDisposition, CascadeOutcome, CascadeReport,
    CascadeResolution, DeclareEmergency, EmergencyDeclaration,
};

const MAX_PROPOSALS_PER_APPOINTMENT: usize = 3;

/// Handles practitioner emergencies: records the leave, enumerates the
/// appointments it displaces, proposes replacement slots, and applies the
/// chosen resolutions through the regular booking path.
pub struct EmergencyCascadeService {
    schedule: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
    availability: Arc<AvailabilityService>,
    slots: Arc<SlotGenerator>,
    booking: Arc<BookingService>,
    directory: Arc<dyn PractitionerDirectory>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: SchedulingPolicy,
}

impl EmergencyCascadeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        availability: Arc<AvailabilityService>,
        slots: Arc<SlotGenerator>,
        booking: Arc<BookingService>,
        directory: Arc<dyn PractitionerDirectory>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        policy: SchedulingPolicy,
    ) -> Self {
        Self {
            schedule,
            appointments,
            availability,
            slots,
            booking,
            directory,
            audit,
            clock,
            policy,
        }
    }

    /// Record emergency leave for the window and return the displaced
    /// appointments with proposals. The leave lands first, so the proposals
    /// already exclude the practitioner's blocked time.
    pub async fn declare(
        &self,
        command: DeclareEmergency,
    ) -> Result<EmergencyDeclaration, SchedulingError> {
        if !self
            .schedule
            .practitioner_exists(command.practitioner_id)
            .await?
        {
            return Err(SchedulingError::NotFound(format!(
                "practitioner {}",
                command.practitioner_id
            )));
        }

        let leave = Leave::from_window(
            command.practitioner_id,
            command.window,
            LeaveStatus::Emergency,
            command.reason,
            self.clock.now(),
        );
        self.schedule.insert_leave(leave.clone()).await?;
        warn!(
            "Emergency leave {} declared for practitioner {}: {} to {}",
            leave.id, command.practitioner_id, command.window.start, command.window.end
        );

        let affected = self
            .affected(command.practitioner_id, command.window)
            .await?;
        Ok(EmergencyDeclaration { leave, affected })
    }

    /// Appointments displaced by a window, each with replacement proposals.
    /// Re-running after some choices were applied returns only what is still
    /// unresolved; rescheduled and cancelled appointments drop out on their
    /// own.
    pub async fn affected(
        &self,
        practitioner_id: Uuid,
        window: TimeSlot,
    ) -> Result<Vec<AffectedAppointment>, SchedulingError> {
        let filter = AppointmentFilter::new()
            .for_practitioner(practitioner_id)
            .overlapping(window)
            .non_cancelled();
        let displaced = self.appointments.find(&filter).await?;

        let mut affected = Vec::new();
        for appointment in displaced
            .into_iter()
            .filter(|a| !a.status.is_terminal())
        {
            let proposals = self.proposals(&appointment).await?;
            affected.push(AffectedAppointment {
                appointment,
                proposals,
            });
        }
        info!(
            "{} appointments affected for practitioner {} in {} to {}",
            affected.len(),
            practitioner_id,
            window.start,
            window.end
        );
        Ok(affected)
    }

    /// Apply the chosen resolutions one by one. Failures are captured per
    /// appointment; the caller decides whether to retry them.
    pub async fn apply(
        &self,
        practitioner_id: Uuid,
        choices: Vec<CascadeChoice>,
        actor: Actor,
    ) -> CascadeReport {
        let mut outcomes = Vec::new();
        for choice in choices {
            let disposition = self.apply_choice(&choice, actor).await;
            if let CascadeDisposition::Failed { error } = &disposition {
                warn!(
                    "Cascade choice for appointment {} failed: {}",
                    choice.appointment_id, error
                );
            }
            outcomes.push(CascadeOutcome {
                appointment_id: choice.appointment_id,
                disposition,
            });
        }

        let report = CascadeReport { outcomes };
        info!(
            "Cascade applied for practitioner {}: {} resolved, {} failed",
            practitioner_id,
            report.resolved_count(),
            report.failed_count()
        );
        self.audit
            .record(AuditEvent {
                occurred_at: self.clock.now(),
                action: AuditAction::CascadeApplied,
                appointment_id: None,
                practitioner_id: Some(practitioner_id),
                actor: Some(actor),
                detail: Some(format!(
                    "{} resolved, {} failed",
                    report.resolved_count(),
                    report.failed_count()
                )),
            })
            .await;
        report
    }

    async fn apply_choice(&self, choice: &CascadeChoice, actor: Actor) -> CascadeDisposition {
        match &choice.resolution {
            CascadeResolution::Reschedule {
                new_start,
                new_practitioner_id,
            } => {
                let command = RescheduleAppointment {
                    appointment_id: choice.appointment_id,
                    new_start: *new_start,
                    new_duration_minutes: None,
                    new_practitioner_id: *new_practitioner_id,
                    reason: Some("practitioner emergency".to_string()),
                    actor,
                };
                match self.booking.reschedule(command).await {
                    Ok(confirmation) => CascadeDisposition::Rescheduled {
                        new_start: confirmation.appointment.start,
                        practitioner_id: confirmation.appointment.practitioner_id,
                    },
                    Err(error) => CascadeDisposition::Failed { error },
                }
            }
            CascadeResolution::Cancel { reason } => {
                let command = CancelAppointment {
                    appointment_id: choice.appointment_id,
                    reason: reason.clone(),
                    actor,
                };
                match self.booking.cancel(command).await {
                    Ok(_) => CascadeDisposition::Cancelled,
                    Err(error) => CascadeDisposition::Failed { error },
                }
            }
        }
    }

    /// Replacement slots for one appointment, scanning day by day from its
    /// original date across the search horizon. The original practitioner is
    /// tried alongside everyone else offering the type.
    async fn proposals(
        &self,
        appointment: &Appointment,
    ) -> Result<Vec<AvailableSlot>, SchedulingError> {
        let mut candidates = vec![appointment.practitioner_id];
        for practitioner in self
            .directory
            .practitioners_for_type(&appointment.appointment_type_id)
            .await?
        {
            if !candidates.contains(&practitioner) {
                candidates.push(practitioner);
            }
        }

        let now = self.clock.now();
        let first_day = appointment.start.date_naive();
        let mut proposals = Vec::new();
        for offset in 0..self.policy.cascade_search_horizon_days {
            let date = first_day + Duration::days(offset);
            let per_practitioner = join_all(
                candidates
                    .iter()
                    .map(|p| self.day_slots(*p, date, appointment)),
            )
            .await;
            for slots in per_practitioner {
                proposals.extend(slots?.into_iter().filter(|s| s.start >= now));
            }
            if proposals.len() >= MAX_PROPOSALS_PER_APPOINTMENT {
                break;
            }
        }
        proposals.truncate(MAX_PROPOSALS_PER_APPOINTMENT);
        Ok(proposals)
    }

    async fn day_slots(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        appointment: &Appointment,
    ) -> Result<Vec<AvailableSlot>, SchedulingError> {
        let settings = self
            .directory
            .type_settings(practitioner_id, &appointment.appointment_type_id)
            .await?;
        let open = self.availability.resolve_day(practitioner_id, date).await?;
        let query =
            SlotQuery::new(appointment.duration_minutes).with_buffer(settings.buffer_minutes);
        self.slots
            .slots_for_day(practitioner_id, &open, date, &query)
            .await
    }
}
