use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::interval::TimeSlot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    /// Opaque identifier owned by the appointment-type collaborator.
    pub appointment_type_id: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    // Stamped exactly once, on the matching transition.
    pub confirmed_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub no_show_at: Option<DateTime<Utc>>,
    pub last_actor: Option<Actor>,
    pub cancellation_reason: Option<String>,
    pub reschedule_reason: Option<String>,
    pub series_id: Option<Uuid>,
    pub occurrence_index: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.start, self.end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    pub fn non_cancelled() -> Vec<AppointmentStatus> {
        vec![
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            AppointmentStatus::CheckedIn,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
        ]
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Patient,
    Practitioner,
    System,
}

/// Per-practitioner settings for one appointment type, with type-level
/// defaults as the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentTypeSettings {
    pub appointment_type_id: String,
    pub default_duration_minutes: i32,
    pub buffer_minutes: i64,
}

// ==============================================================================
// COMMANDS
// ==============================================================================
//
// Schedule changes are explicit commands validated and applied atomically,
// never free-form field merges.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointment {
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: i32,
    /// Hold obtained during slot selection; verified right before commit.
    pub lock_id: Uuid,
    pub actor: Actor,
    pub series_id: Option<Uuid>,
    pub occurrence_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointment {
    pub appointment_id: Uuid,
    pub new_start: DateTime<Utc>,
    pub new_duration_minutes: Option<i32>,
    /// Move to a different practitioner, e.g. during an emergency cascade.
    pub new_practitioner_id: Option<Uuid>,
    pub reason: Option<String>,
    pub actor: Actor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointment {
    pub appointment_id: Uuid,
    pub reason: String,
    pub actor: Actor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub appointment_id: Uuid,
    pub to: AppointmentStatus,
    pub actor: Actor,
    pub reason: Option<String>,
}

/// The only core-field edit allowed outside a reschedule; time and
/// practitioner changes must claim a new interval instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentType {
    pub appointment_id: Uuid,
    pub appointment_type_id: String,
    pub actor: Actor,
}
