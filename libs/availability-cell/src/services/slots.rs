use chrono::{Duration, NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_models::{SchedulingError, TimeSlot};
use shared_storage::{AppointmentFilter, AppointmentStore};

use crate::models::{AvailableSlot, SlotQuery};

/// Walks open intervals at a fixed stride and drops candidates that collide
/// with existing appointments. Pure once the day's appointments are fetched,
/// so regenerating with the same inputs yields the same slots.
pub struct SlotGenerator {
    appointments: Arc<dyn AppointmentStore>,
}

impl SlotGenerator {
    pub fn new(appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { appointments }
    }

    /// Candidate slots for one date. Existing appointments are fetched once
    /// per date, not per slot.
    pub async fn slots_for_day(
        &self,
        practitioner_id: Uuid,
        open: &[TimeSlot],
        date: NaiveDate,
        query: &SlotQuery,
    ) -> Result<Vec<AvailableSlot>, SchedulingError> {
        if open.is_empty() {
            return Ok(vec![]);
        }

        let filter = AppointmentFilter::new()
            .for_practitioner(practitioner_id)
            .overlapping(whole_day(date))
            .non_cancelled();
        let existing = self.appointments.find(&filter).await?;

        // Buffer extends each appointment's footprint past its end before
        // free space is computed.
        let busy: Vec<TimeSlot> = existing
            .iter()
            .map(|a| TimeSlot::new(a.start, a.end() + Duration::minutes(query.buffer_minutes)))
            .collect();

        let slots: Vec<AvailableSlot> =
            candidates(practitioner_id, open, &busy, query).collect();
        debug!(
            "Generated {} candidate slots for practitioner {} on {}",
            slots.len(),
            practitioner_id,
            date
        );
        Ok(slots)
    }
}

/// Lazy walk over the open intervals; chronological as long as `open` is the
/// resolver's sorted output.
pub fn candidates<'a>(
    practitioner_id: Uuid,
    open: &'a [TimeSlot],
    busy: &'a [TimeSlot],
    query: &SlotQuery,
) -> impl Iterator<Item = AvailableSlot> + 'a {
    let duration = Duration::minutes(query.duration_minutes as i64);
    let stride = Duration::minutes(query.stride() as i64);
    let duration_minutes = query.duration_minutes;

    open.iter().flat_map(move |interval| {
        let mut cursor = interval.start;
        let mut slots = Vec::new();
        // No partial slots: the remainder shorter than the duration is dropped.
        while cursor + duration <= interval.end {
            let candidate = TimeSlot::new(cursor, cursor + duration);
            if !busy.iter().any(|b| b.overlaps(&candidate)) {
                slots.push(AvailableSlot {
                    practitioner_id,
                    start: candidate.start,
                    end: candidate.end,
                    duration_minutes,
                });
            }
            cursor += stride;
        }
        slots.into_iter()
    })
}

fn whole_day(date: NaiveDate) -> TimeSlot {
    let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    let next = date.succ_opt().unwrap_or(date);
    TimeSlot::new(
        date.and_time(midnight).and_utc(),
        next.and_time(midnight).and_utc(),
    )
}
