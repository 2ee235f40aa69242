use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::{
    coalesce, day_of_week, subtract_all, SchedulingError, SpecialDateKind, TimeSlot,
    WorkingHoursTemplate,
};
use shared_storage::ScheduleStore;

/// Merges the weekly template, special dates, breaks and leave into the open
/// intervals for a day.
pub struct AvailabilityService {
    schedule: Arc<dyn ScheduleStore>,
}

impl AvailabilityService {
    pub fn new(schedule: Arc<dyn ScheduleStore>) -> Self {
        Self { schedule }
    }

    /// Ordered, non-overlapping open intervals for one date.
    pub async fn resolve_day(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, SchedulingError> {
        if !self.schedule.practitioner_exists(practitioner_id).await? {
            return Err(SchedulingError::NotFound(format!(
                "practitioner {}",
                practitioner_id
            )));
        }

        let base = self.base_intervals(practitioner_id, date).await?;
        if base.is_empty() {
            return Ok(vec![]);
        }

        let mut busy = Vec::new();

        for break_time in self.schedule.breaks_for(practitioner_id, date).await? {
            if break_time.start_time >= break_time.end_time {
                warn!(
                    "Break {} for practitioner {} has end <= start, ignoring",
                    break_time.id, practitioner_id
                );
                continue;
            }
            busy.push(day_interval(date, break_time.start_time, break_time.end_time));
        }

        let day = whole_day(date);
        for leave in self
            .schedule
            .leaves_overlapping(practitioner_id, date, date)
            .await?
        {
            if !leave.status.removes_availability() {
                continue;
            }
            if let Some(block) = leave.as_block().intersect(&day) {
                busy.push(block);
            }
        }

        Ok(coalesce(subtract_all(base, &busy)))
    }

    /// Open intervals per date over an inclusive range.
    pub async fn resolve_range(
        &self,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, Vec<TimeSlot>)>, SchedulingError> {
        let mut days = Vec::new();
        let mut date = from;
        while date <= to {
            let open = self.resolve_day(practitioner_id, date).await?;
            days.push((date, open));
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        Ok(days)
    }

    /// True when the resolver reports the day fully closed.
    pub async fn is_closed(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, SchedulingError> {
        Ok(self.resolve_day(practitioner_id, date).await?.is_empty())
    }

    /// Template hours for the date, unless a special date replaces them
    /// wholesale. Malformed entries degrade to a closed day instead of
    /// failing the resolver.
    async fn base_intervals(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, SchedulingError> {
        if let Some(special) = self.schedule.special_date(practitioner_id, date).await? {
            return Ok(match special.kind {
                SpecialDateKind::Closed => {
                    debug!(
                        "Practitioner {} has a closed special date on {}",
                        practitioner_id, date
                    );
                    vec![]
                }
                SpecialDateKind::Override {
                    start_time,
                    end_time,
                } => {
                    if start_time >= end_time {
                        warn!(
                            "Special date {} has end <= start, treating {} as closed",
                            special.id, date
                        );
                        vec![]
                    } else {
                        vec![day_interval(date, start_time, end_time)]
                    }
                }
            });
        }

        let templates = self
            .schedule
            .templates_for_day(practitioner_id, day_of_week(date))
            .await?;

        let Some(current) = pick_current(templates) else {
            return Ok(vec![]);
        };

        if !current.is_well_formed() {
            warn!(
                "Working hours template {} has end <= start, treating {} as closed",
                current.id, date
            );
            return Ok(vec![]);
        }

        Ok(vec![day_interval(
            date,
            current.start_time,
            current.end_time,
        )])
    }
}

/// Last-write-wins when several template rows exist for one weekday. An
/// explicit policy decision; conflicting rows are never merged.
fn pick_current(mut templates: Vec<WorkingHoursTemplate>) -> Option<WorkingHoursTemplate> {
    if templates.len() > 1 {
        debug!(
            "{} template rows for the same weekday, taking the most recent",
            templates.len()
        );
    }
    templates.sort_by_key(|t| t.updated_at);
    templates.pop()
}

fn day_interval(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> TimeSlot {
    TimeSlot::new(date.and_time(start).and_utc(), date.and_time(end).and_utc())
}

fn whole_day(date: NaiveDate) -> TimeSlot {
    let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    let next = date.succ_opt().unwrap_or(date);
    TimeSlot::new(
        date.and_time(midnight).and_utc(),
        next.and_time(midnight).and_utc(),
    )
}
