use uuid::Uuid;

use shared_models::{Appointment, AppointmentStatus, TimeSlot};

/// Typed appointment query passed to the persistence layer, instead of
/// ad-hoc filter strings built field by field.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub practitioner_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub overlapping: Option<TimeSlot>,
    pub statuses: Option<Vec<AppointmentStatus>>,
    pub series_id: Option<Uuid>,
    pub exclude_id: Option<Uuid>,
}

impl AppointmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_practitioner(mut self, practitioner_id: Uuid) -> Self {
        self.practitioner_id = Some(practitioner_id);
        self
    }

    pub fn for_patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn overlapping(mut self, interval: TimeSlot) -> Self {
        self.overlapping = Some(interval);
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<AppointmentStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn non_cancelled(self) -> Self {
        self.with_statuses(AppointmentStatus::non_cancelled())
    }

    pub fn in_series(mut self, series_id: Uuid) -> Self {
        self.series_id = Some(series_id);
        self
    }

    pub fn excluding(mut self, appointment_id: Uuid) -> Self {
        self.exclude_id = Some(appointment_id);
        self
    }

    /// Predicate form, used by the in-memory store; persistent backends
    /// translate the same fields into indexed queries.
    pub fn matches(&self, appointment: &Appointment) -> bool {
        if let Some(practitioner_id) = self.practitioner_id {
            if appointment.practitioner_id != practitioner_id {
                return false;
            }
        }
        if let Some(patient_id) = self.patient_id {
            if appointment.patient_id != patient_id {
                return false;
            }
        }
        if let Some(interval) = &self.overlapping {
            if !appointment.slot().overlaps(interval) {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&appointment.status) {
                return false;
            }
        }
        if let Some(series_id) = self.series_id {
            if appointment.series_id != Some(series_id) {
                return false;
            }
        }
        if let Some(exclude_id) = self.exclude_id {
            if appointment.id == exclude_id {
                return false;
            }
        }
        true
    }
}
