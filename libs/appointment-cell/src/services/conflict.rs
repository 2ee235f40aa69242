use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::SchedulingPolicy;
use shared_models::{Appointment, SchedulingError, TimeSlot};
use shared_storage::{AppointmentFilter, AppointmentStore};

use crate::models::ConflictReport;

/// Interval-overlap checks against current persisted state. Callers run this
/// at commit time, after lock verification, to close the booking race.
pub struct ConflictDetectionService {
    appointments: Arc<dyn AppointmentStore>,
    policy: SchedulingPolicy,
}

impl ConflictDetectionService {
    pub fn new(appointments: Arc<dyn AppointmentStore>, policy: SchedulingPolicy) -> Self {
        Self {
            appointments,
            policy,
        }
    }

    /// Both checks for one candidate interval. `exclude` skips the
    /// appointment being rescheduled.
    pub async fn check(
        &self,
        practitioner_id: Uuid,
        patient_id: Uuid,
        candidate: TimeSlot,
        exclude: Option<Uuid>,
    ) -> Result<ConflictReport, SchedulingError> {
        let practitioner_conflicts = self
            .practitioner_conflicts(practitioner_id, candidate, exclude)
            .await?;
        let patient_conflicts = self
            .patient_conflicts(patient_id, candidate, exclude)
            .await?;

        let blocking = !practitioner_conflicts.is_empty()
            || (self.policy.patient_conflict_blocking && !patient_conflicts.is_empty());

        let report = ConflictReport {
            practitioner_conflicts,
            patient_conflicts,
            blocking,
        };
        if report.blocking {
            warn!(
                "Blocking conflict for practitioner {} at {}: {} practitioner / {} patient overlaps",
                practitioner_id,
                candidate.start,
                report.practitioner_conflicts.len(),
                report.patient_conflicts.len()
            );
        } else if report.has_any() {
            debug!(
                "Advisory patient overlaps at {}: {}",
                candidate.start,
                report.patient_conflicts.len()
            );
        }

        Ok(report)
    }

    /// Non-cancelled appointments for the practitioner overlapping the
    /// candidate, widened by the symmetric buffer. Always blocking.
    pub async fn practitioner_conflicts(
        &self,
        practitioner_id: Uuid,
        candidate: TimeSlot,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let padded = candidate.padded(self.policy.practitioner_buffer_minutes);
        debug!(
            "Checking practitioner {} conflicts from {} to {}",
            practitioner_id, padded.start, padded.end
        );

        let mut filter = AppointmentFilter::new()
            .for_practitioner(practitioner_id)
            .overlapping(padded)
            .non_cancelled();
        if let Some(id) = exclude {
            filter = filter.excluding(id);
        }

        self.appointments.find(&filter).await
    }

    /// Non-cancelled appointments for the patient, across practitioners,
    /// within the wider symmetric window. Advisory unless policy blocks.
    pub async fn patient_conflicts(
        &self,
        patient_id: Uuid,
        candidate: TimeSlot,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let window = candidate.padded(self.policy.patient_conflict_window_minutes);

        let mut filter = AppointmentFilter::new()
            .for_patient(patient_id)
            .overlapping(window)
            .non_cancelled();
        if let Some(id) = exclude {
            filter = filter.excluding(id);
        }

        self.appointments.find(&filter).await
    }

    /// Collapse a report into the booking decision: advisories pass through,
    /// blocking overlaps fail with `Conflict`.
    pub fn ensure_bookable(
        &self,
        report: ConflictReport,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        if report.blocking {
            return Err(SchedulingError::Conflict);
        }
        Ok(report.patient_conflicts)
    }
}
