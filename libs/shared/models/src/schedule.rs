use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::TimeSlot;

/// Day of week as stored: 0 = Sunday through 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// One weekly working-hours row. Several rows may exist for the same weekday
/// after conflicting updates; resolution picks the most recently written one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHoursTemplate {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub updated_at: DateTime<Utc>,
}

impl WorkingHoursTemplate {
    pub fn is_well_formed(&self) -> bool {
        self.start_time < self.end_time
    }
}

/// Per-date override. Takes precedence over the weekly template wholesale,
/// never merged with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialDate {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    pub kind: SpecialDateKind,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialDateKind {
    Closed,
    Override {
        start_time: NaiveTime,
        end_time: NaiveTime,
    },
}

/// Recurring or date-scoped interval subtracted from open time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakTime {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    /// None applies on every working day.
    pub day_of_week: Option<i32>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub active: bool,
    pub effective_from: Option<NaiveDate>,
}

impl BreakTime {
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        if !self.active {
            return false;
        }
        if let Some(from) = self.effective_from {
            if date < from {
                return false;
            }
        }
        match self.day_of_week {
            Some(dow) => dow == day_of_week(date),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Denied,
    Emergency,
}

impl LeaveStatus {
    /// Only approved or emergency leave removes time from availability.
    pub fn removes_availability(&self) -> bool {
        matches!(self, LeaveStatus::Approved | LeaveStatus::Emergency)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leave {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Set together for partial-day leave; None means whole days.
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub status: LeaveStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Leave {
    /// Build a leave covering an exact UTC window, used for emergency
    /// unavailability. Whole-day windows lose the time component.
    pub fn from_window(
        practitioner_id: Uuid,
        window: TimeSlot,
        status: LeaveStatus,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let whole_days = window.start.time() == midnight && window.end.time() == midnight;

        let (end_date, start_time, end_time) = if whole_days {
            (window.end.date_naive().pred_opt().unwrap_or_else(|| window.end.date_naive()), None, None)
        } else {
            (
                window.end.date_naive(),
                Some(window.start.time()),
                Some(window.end.time()),
            )
        };

        Self {
            id: Uuid::new_v4(),
            practitioner_id,
            start_date: window.start.date_naive(),
            end_date,
            start_time,
            end_time,
            status,
            reason,
            created_at,
        }
    }

    /// The leave as one contiguous UTC block.
    pub fn as_block(&self) -> TimeSlot {
        let start = self
            .start_date
            .and_time(self.start_time.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap()))
            .and_utc();
        let end = match self.end_time {
            Some(t) => self.end_date.and_time(t).and_utc(),
            None => self
                .end_date
                .succ_opt()
                .unwrap_or(self.end_date)
                .and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap())
                .and_utc(),
        };
        TimeSlot::new(start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_of_week_is_sunday_based() {
        // 2025-03-09 is a Sunday.
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()), 0);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()), 1);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()), 6);
    }

    #[test]
    fn leave_from_partial_window_keeps_times() {
        let window = TimeSlot::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 13, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
        );
        let leave = Leave::from_window(
            Uuid::new_v4(),
            window,
            LeaveStatus::Emergency,
            None,
            Utc::now(),
        );
        assert_eq!(leave.start_date, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(leave.end_date, leave.start_date);
        assert_eq!(leave.as_block(), window);
    }

    #[test]
    fn leave_from_whole_day_window_drops_times() {
        let window = TimeSlot::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 12, 0, 0, 0).unwrap(),
        );
        let leave = Leave::from_window(
            Uuid::new_v4(),
            window,
            LeaveStatus::Approved,
            None,
            Utc::now(),
        );
        assert_eq!(leave.start_time, None);
        assert_eq!(leave.end_date, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(leave.as_block(), window);
    }

    #[test]
    fn break_scoping_respects_flags() {
        let brk = BreakTime {
            id: Uuid::new_v4(),
            practitioner_id: Uuid::new_v4(),
            day_of_week: Some(1),
            start_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            active: true,
            effective_from: Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()),
        };
        // Monday after effective date.
        assert!(brk.applies_on(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()));
        // Tuesday.
        assert!(!brk.applies_on(NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()));
        // Monday before effective date.
        assert!(!brk.applies_on(NaiveDate::from_ymd_opt(2025, 2, 24).unwrap()));
    }
}
