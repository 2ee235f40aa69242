use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Candidate bookable interval of exactly the requested duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub practitioner_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub duration_minutes: i32,
    /// Added after each existing appointment before computing free space.
    pub buffer_minutes: i64,
    /// Step between candidate starts; defaults to the duration.
    pub stride_minutes: Option<i32>,
}

impl SlotQuery {
    pub fn new(duration_minutes: i32) -> Self {
        Self {
            duration_minutes,
            buffer_minutes: 0,
            stride_minutes: None,
        }
    }

    pub fn with_buffer(mut self, buffer_minutes: i64) -> Self {
        self.buffer_minutes = buffer_minutes;
        self
    }

    pub fn with_stride(mut self, stride_minutes: i32) -> Self {
        self.stride_minutes = Some(stride_minutes);
        self
    }

    pub fn stride(&self) -> i32 {
        self.stride_minutes.unwrap_or(self.duration_minutes)
    }
}
