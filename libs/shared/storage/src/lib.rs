pub mod clock;
pub mod filter;
pub mod memory;
pub mod redis;

pub use clock::{Clock, ManualClock, SystemClock};
pub use filter::AppointmentFilter;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    Appointment, AppointmentTypeSettings, AuditEvent, BreakTime, Leave, NotificationEvent,
    RecurringSeries, SchedulingError, SlotLock, SpecialDate, WorkingHoursTemplate,
};

/// Availability configuration: weekly templates, per-date overrides, breaks
/// and leave. All scheduling reads go through here so commit-time checks see
/// current persisted state.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn practitioner_exists(&self, practitioner_id: Uuid) -> Result<bool, SchedulingError>;

    async fn templates_for_day(
        &self,
        practitioner_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkingHoursTemplate>, SchedulingError>;

    async fn special_date(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<SpecialDate>, SchedulingError>;

    async fn breaks_for(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BreakTime>, SchedulingError>;

    async fn leaves_overlapping(
        &self,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Leave>, SchedulingError>;

    async fn insert_leave(&self, leave: Leave) -> Result<(), SchedulingError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, SchedulingError>;

    async fn insert(&self, appointment: Appointment) -> Result<(), SchedulingError>;

    /// Whole-record replace keyed by id. Callers validate the change as a
    /// command first; the store never merges fields.
    async fn update(&self, appointment: Appointment) -> Result<(), SchedulingError>;

    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, SchedulingError>;
}

#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<RecurringSeries>, SchedulingError>;

    async fn insert(&self, series: RecurringSeries) -> Result<(), SchedulingError>;

    async fn update(&self, series: RecurringSeries) -> Result<(), SchedulingError>;
}

/// Ephemeral slot-hold storage. `try_acquire` must be a single conditional
/// write at the storage layer; that is the only mutual exclusion the engine
/// relies on.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Returns false when an unexpired lock held under a different lock id
    /// overlaps the same practitioner/interval. Re-acquiring under the same
    /// lock id renews instead of conflicting.
    async fn try_acquire(
        &self,
        lock: SlotLock,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulingError>;

    async fn get(&self, lock_id: Uuid) -> Result<Option<SlotLock>, SchedulingError>;

    /// Best-effort delete; a missing lock is not an error.
    async fn release(&self, lock_id: Uuid) -> Result<(), SchedulingError>;

    /// Remove expired locks. Idempotent and safe to run concurrently.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<u32, SchedulingError>;
}

/// Lookup of practitioners by the appointment types they offer, plus
/// per-practitioner type settings with type-level defaults as fallback.
#[async_trait]
pub trait PractitionerDirectory: Send + Sync {
    async fn practitioners_for_type(
        &self,
        appointment_type_id: &str,
    ) -> Result<Vec<Uuid>, SchedulingError>;

    async fn type_settings(
        &self,
        practitioner_id: Uuid,
        appointment_type_id: &str,
    ) -> Result<AppointmentTypeSettings, SchedulingError>;
}

/// Fire-and-forget notification dispatch. Implementations swallow their own
/// delivery failures; scheduling never rolls back on them.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: NotificationEvent);
}

/// Structured audit/event sink. Reported and forgotten.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Pick the lock backend from configuration: Redis when a URL is set, the
/// in-process store otherwise. In-process holds are only safe for a single
/// service instance.
pub fn lock_store_from_config(config: &AppConfig) -> Result<Arc<dyn LockStore>, SchedulingError> {
    match config.redis_url {
        Some(_) => {
            info!("Using Redis-backed slot lock store");
            Ok(Arc::new(redis::RedisLockStore::new(config)?))
        }
        None => {
            info!("Using in-process slot lock store");
            Ok(Arc::new(memory::InMemoryLockStore::new()))
        }
    }
}
