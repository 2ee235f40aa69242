use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` in UTC. All overlap math in the engine
/// goes through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn from_start(start: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(duration_minutes as i64),
        }
    }

    /// `[start, end)` overlap: true iff the intervals share any instant.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// True if `other` lies entirely within this interval.
    pub fn contains(&self, other: &TimeSlot) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// Same interval widened symmetrically by `minutes` on both sides.
    pub fn padded(&self, minutes: i64) -> TimeSlot {
        TimeSlot {
            start: self.start - Duration::minutes(minutes),
            end: self.end + Duration::minutes(minutes),
        }
    }

    /// The part of this interval that falls inside `bound`, if any.
    pub fn intersect(&self, bound: &TimeSlot) -> Option<TimeSlot> {
        let start = self.start.max(bound.start);
        let end = self.end.min(bound.end);
        if start < end {
            Some(TimeSlot { start, end })
        } else {
            None
        }
    }
}

/// Merge adjacent and overlapping intervals into the minimal sorted set.
pub fn coalesce(mut slots: Vec<TimeSlot>) -> Vec<TimeSlot> {
    slots.retain(TimeSlot::is_well_formed);
    slots.sort_by_key(|s| s.start);

    let mut merged: Vec<TimeSlot> = Vec::with_capacity(slots.len());
    for slot in slots {
        match merged.last_mut() {
            Some(last) if slot.start <= last.end => {
                last.end = last.end.max(slot.end);
            }
            _ => merged.push(slot),
        }
    }
    merged
}

/// Remove every `busy` interval from `open`, keeping order.
pub fn subtract_all(open: Vec<TimeSlot>, busy: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut remaining = open;
    for block in busy {
        remaining = remaining
            .into_iter()
            .flat_map(|slot| subtract_one(slot, block))
            .collect();
    }
    remaining
}

fn subtract_one(slot: TimeSlot, busy: &TimeSlot) -> Vec<TimeSlot> {
    if !slot.overlaps(busy) {
        return vec![slot];
    }

    let mut pieces = Vec::with_capacity(2);
    if slot.start < busy.start {
        pieces.push(TimeSlot::new(slot.start, busy.start));
    }
    if busy.end < slot.end {
        pieces.push(TimeSlot::new(busy.end, slot.end));
    }
    pieces
}
