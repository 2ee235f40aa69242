use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{Actor, RecurrenceRule};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSeries {
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: String,
    pub rule: RecurrenceRule,
    pub skip_holidays: bool,
    pub auto_reschedule: bool,
    pub reschedule_window_days: i64,
    pub actor: Actor,
}

/// Changes applied across a series (or its tail) during a scoped edit.
/// Interval-affecting fields only; anything else is a per-appointment edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesEdit {
    pub new_time_of_day: Option<NaiveTime>,
    pub new_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionReport {
    pub series_id: Uuid,
    pub outcomes: Vec<OccurrenceOutcome>,
    /// Set when the date range ran out before the requested occurrence count
    /// was filled. A warning, not a failure.
    pub partial: bool,
}

impl ExpansionReport {
    pub fn booked_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.disposition, OccurrenceDisposition::Booked { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceOutcome {
    pub occurrence_index: u32,
    pub anchor_date: NaiveDate,
    pub disposition: OccurrenceDisposition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum OccurrenceDisposition {
    Booked { appointment_id: Uuid },
    Unscheduled { reason: String },
}
