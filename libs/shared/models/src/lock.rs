use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::TimeSlot;

/// Short-lived exclusive hold on a (practitioner, interval) pair. Lives only
/// in ephemeral storage with a TTL; never referenced once booking completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotLock {
    pub lock_id: Uuid,
    pub practitioner_id: Uuid,
    pub interval: TimeSlot,
    pub expires_at: DateTime<Utc>,
}

impl SlotLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
