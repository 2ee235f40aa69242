use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use availability_cell::AvailableSlot;
use shared_models::{Actor, Appointment, Leave, SchedulingError, TimeSlot};

/// Take a practitioner out of service for a window, effective immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclareEmergency {
    pub practitioner_id: Uuid,
    pub window: TimeSlot,
    pub reason: Option<String>,
    pub actor: Actor,
}

/// The recorded leave plus every appointment it displaced, each with
/// alternative slots already worked out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyDeclaration {
    pub leave: Leave,
    pub affected: Vec<AffectedAppointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedAppointment {
    pub appointment: Appointment,
    pub proposals: Vec<AvailableSlot>,
}

/// Chosen resolution for one displaced appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeChoice {
    pub appointment_id: Uuid,
    pub resolution: CascadeResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum CascadeResolution {
    Reschedule {
        new_start: DateTime<Utc>,
        new_practitioner_id: Option<Uuid>,
    },
    Cancel {
        reason: String,
    },
}

/// Per-appointment results of applying a set of choices. One choice failing
/// never blocks the rest.
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub outcomes: Vec<CascadeOutcome>,
}

#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub appointment_id: Uuid,
    pub disposition: CascadeDisposition,
}

#[derive(Debug, Clone)]
pub enum CascadeDisposition {
    Rescheduled {
        new_start: DateTime<Utc>,
        practitioner_id: Uuid,
    },
    Cancelled,
    Failed {
        error: SchedulingError,
    },
}

impl CascadeReport {
    pub fn resolved_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.disposition, CascadeDisposition::Failed { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.resolved_count()
    }
}
