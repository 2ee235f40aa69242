use serde::{Deserialize, Serialize};

use shared_models::Appointment;

/// Outcome of the two independent overlap checks. Practitioner conflicts are
/// always blocking; patient conflicts block only when policy says so and are
/// otherwise surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub practitioner_conflicts: Vec<Appointment>,
    pub patient_conflicts: Vec<Appointment>,
    pub blocking: bool,
}

impl ConflictReport {
    pub fn has_any(&self) -> bool {
        !self.practitioner_conflicts.is_empty() || !self.patient_conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    /// Non-blocking patient overlaps surfaced alongside the booking.
    pub patient_advisories: Vec<Appointment>,
}
