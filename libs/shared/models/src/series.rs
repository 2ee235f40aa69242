use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulingError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSeries {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: String,
    pub rule: RecurrenceRule,
    pub skip_holidays: bool,
    pub auto_reschedule: bool,
    pub reschedule_window_days: i64,
    pub status: SeriesStatus,
    /// Identities of appointments generated for this series, in occurrence order.
    pub appointment_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Active,
    Cancelled,
    PartiallyCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: RecurrenceFrequency,
    pub time_of_day: NaiveTime,
    pub duration_minutes: i32,
    pub start_date: NaiveDate,
    pub end: SeriesEnd,
}

/// One explicit anchor strategy per series; a rule can never be both
/// day-of-month and nth-weekday at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Weekly { interval_weeks: u32, weekday: i32 },
    Monthly { anchor: MonthlyAnchor },
    Custom { interval_days: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyAnchor {
    DayOfMonth(u32),
    NthWeekday { nth: u32, weekday: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesEnd {
    Until(NaiveDate),
    Count(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    This,
    ThisAndFuture,
    All,
}

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.duration_minutes <= 0 {
            return Err(SchedulingError::InvalidRecurrenceRule(
                "duration must be positive".to_string(),
            ));
        }

        match &self.frequency {
            RecurrenceFrequency::Weekly {
                interval_weeks,
                weekday,
            } => {
                if *interval_weeks == 0 {
                    return Err(SchedulingError::InvalidRecurrenceRule(
                        "weekly interval must be at least 1".to_string(),
                    ));
                }
                validate_weekday(*weekday)?;
            }
            RecurrenceFrequency::Monthly { anchor } => match anchor {
                MonthlyAnchor::DayOfMonth(day) => {
                    if *day == 0 || *day > 31 {
                        return Err(SchedulingError::InvalidRecurrenceRule(format!(
                            "day of month {} is out of range",
                            day
                        )));
                    }
                }
                MonthlyAnchor::NthWeekday { nth, weekday } => {
                    if *nth == 0 || *nth > 5 {
                        return Err(SchedulingError::InvalidRecurrenceRule(format!(
                            "nth weekday {} is out of range",
                            nth
                        )));
                    }
                    validate_weekday(*weekday)?;
                }
            },
            RecurrenceFrequency::Custom { interval_days } => {
                if *interval_days == 0 {
                    return Err(SchedulingError::InvalidRecurrenceRule(
                        "custom frequency requires a positive day interval".to_string(),
                    ));
                }
            }
        }

        if let SeriesEnd::Count(count) = self.end {
            if count == 0 {
                return Err(SchedulingError::InvalidRecurrenceRule(
                    "occurrence count must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn validate_weekday(weekday: i32) -> Result<(), SchedulingError> {
    if !(0..=6).contains(&weekday) {
        return Err(SchedulingError::InvalidRecurrenceRule(format!(
            "weekday {} must be between 0 (Sunday) and 6 (Saturday)",
            weekday
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn rule(frequency: RecurrenceFrequency) -> RecurrenceRule {
        RecurrenceRule {
            frequency,
            time_of_day: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 30,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            end: SeriesEnd::Count(4),
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let invalid = rule(RecurrenceFrequency::Custom { interval_days: 0 });
        assert_matches!(
            invalid.validate(),
            Err(SchedulingError::InvalidRecurrenceRule(_))
        );
    }

    #[test]
    fn out_of_range_weekday_is_rejected() {
        let invalid = rule(RecurrenceFrequency::Weekly {
            interval_weeks: 1,
            weekday: 7,
        });
        assert_matches!(
            invalid.validate(),
            Err(SchedulingError::InvalidRecurrenceRule(_))
        );
    }

    #[test]
    fn well_formed_rules_pass() {
        assert!(rule(RecurrenceFrequency::Weekly {
            interval_weeks: 2,
            weekday: 1
        })
        .validate()
        .is_ok());
        assert!(rule(RecurrenceFrequency::Monthly {
            anchor: MonthlyAnchor::NthWeekday { nth: 2, weekday: 3 }
        })
        .validate()
        .is_ok());
    }
}
