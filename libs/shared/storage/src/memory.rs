//! In-memory reference implementations of the storage contracts. They back
//! the engine's test suites and stand in for real collaborators in local
//! runs; semantics mirror what a persistent backend must provide.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentTypeSettings, AuditEvent, BreakTime, Leave, NotificationEvent,
    RecurringSeries, SchedulingError, SlotLock, SpecialDate, WorkingHoursTemplate,
};

use crate::{
    AppointmentFilter, AppointmentStore, AuditSink, LockStore, NotificationDispatcher,
    PractitionerDirectory, ScheduleStore, SeriesStore,
};

// ==============================================================================
// SCHEDULE STORE
// ==============================================================================

#[derive(Default)]
struct ScheduleData {
    practitioners: HashSet<Uuid>,
    templates: Vec<WorkingHoursTemplate>,
    special_dates: Vec<SpecialDate>,
    breaks: Vec<BreakTime>,
    leaves: Vec<Leave>,
}

#[derive(Default)]
pub struct InMemoryScheduleStore {
    inner: RwLock<ScheduleData>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_practitioner(&self, practitioner_id: Uuid) {
        self.inner.write().await.practitioners.insert(practitioner_id);
    }

    pub async fn add_template(&self, template: WorkingHoursTemplate) {
        let mut data = self.inner.write().await;
        data.practitioners.insert(template.practitioner_id);
        data.templates.push(template);
    }

    pub async fn add_special_date(&self, special: SpecialDate) {
        let mut data = self.inner.write().await;
        data.practitioners.insert(special.practitioner_id);
        data.special_dates.push(special);
    }

    pub async fn add_break(&self, break_time: BreakTime) {
        let mut data = self.inner.write().await;
        data.practitioners.insert(break_time.practitioner_id);
        data.breaks.push(break_time);
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn practitioner_exists(&self, practitioner_id: Uuid) -> Result<bool, SchedulingError> {
        Ok(self.inner.read().await.practitioners.contains(&practitioner_id))
    }

    async fn templates_for_day(
        &self,
        practitioner_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkingHoursTemplate>, SchedulingError> {
        Ok(self
            .inner
            .read()
            .await
            .templates
            .iter()
            .filter(|t| t.practitioner_id == practitioner_id && t.day_of_week == day_of_week)
            .cloned()
            .collect())
    }

    async fn special_date(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<SpecialDate>, SchedulingError> {
        Ok(self
            .inner
            .read()
            .await
            .special_dates
            .iter()
            .find(|s| s.practitioner_id == practitioner_id && s.date == date)
            .cloned())
    }

    async fn breaks_for(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BreakTime>, SchedulingError> {
        Ok(self
            .inner
            .read()
            .await
            .breaks
            .iter()
            .filter(|b| b.practitioner_id == practitioner_id && b.applies_on(date))
            .cloned()
            .collect())
    }

    async fn leaves_overlapping(
        &self,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Leave>, SchedulingError> {
        Ok(self
            .inner
            .read()
            .await
            .leaves
            .iter()
            .filter(|l| {
                l.practitioner_id == practitioner_id && l.start_date <= to && l.end_date >= from
            })
            .cloned()
            .collect())
    }

    async fn insert_leave(&self, leave: Leave) -> Result<(), SchedulingError> {
        let mut data = self.inner.write().await;
        data.practitioners.insert(leave.practitioner_id);
        data.leaves.push(leave);
        Ok(())
    }
}

// ==============================================================================
// APPOINTMENT STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    inner: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, SchedulingError> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn insert(&self, appointment: Appointment) -> Result<(), SchedulingError> {
        let mut data = self.inner.write().await;
        if data.contains_key(&appointment.id) {
            return Err(SchedulingError::Storage(format!(
                "appointment {} already exists",
                appointment.id
            )));
        }
        data.insert(appointment.id, appointment);
        Ok(())
    }

    async fn update(&self, appointment: Appointment) -> Result<(), SchedulingError> {
        let mut data = self.inner.write().await;
        if !data.contains_key(&appointment.id) {
            return Err(SchedulingError::NotFound(format!(
                "appointment {}",
                appointment.id
            )));
        }
        data.insert(appointment.id, appointment);
        Ok(())
    }

    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, SchedulingError> {
        let mut found: Vec<Appointment> = self
            .inner
            .read()
            .await
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.start);
        Ok(found)
    }
}

// ==============================================================================
// SERIES STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemorySeriesStore {
    inner: RwLock<HashMap<Uuid, RecurringSeries>>,
}

impl InMemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn get(&self, id: Uuid) -> Result<Option<RecurringSeries>, SchedulingError> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn insert(&self, series: RecurringSeries) -> Result<(), SchedulingError> {
        let mut data = self.inner.write().await;
        if data.contains_key(&series.id) {
            return Err(SchedulingError::Storage(format!(
                "series {} already exists",
                series.id
            )));
        }
        data.insert(series.id, series);
        Ok(())
    }

    async fn update(&self, series: RecurringSeries) -> Result<(), SchedulingError> {
        let mut data = self.inner.write().await;
        if !data.contains_key(&series.id) {
            return Err(SchedulingError::NotFound(format!("series {}", series.id)));
        }
        data.insert(series.id, series);
        Ok(())
    }
}

// ==============================================================================
// LOCK STORE
// ==============================================================================

/// Conditional insert under one mutex; the in-process equivalent of the
/// Redis store's atomic conditional write.
#[derive(Default)]
pub struct InMemoryLockStore {
    inner: Mutex<HashMap<Uuid, SlotLock>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        lock: SlotLock,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulingError> {
        let mut locks = self.inner.lock().await;

        let conflicting = locks.values().any(|held| {
            held.lock_id != lock.lock_id
                && held.practitioner_id == lock.practitioner_id
                && !held.is_expired(now)
                && held.interval.overlaps(&lock.interval)
        });
        if conflicting {
            return Ok(false);
        }

        locks.insert(lock.lock_id, lock);
        Ok(true)
    }

    async fn get(&self, lock_id: Uuid) -> Result<Option<SlotLock>, SchedulingError> {
        Ok(self.inner.lock().await.get(&lock_id).cloned())
    }

    async fn release(&self, lock_id: Uuid) -> Result<(), SchedulingError> {
        self.inner.lock().await.remove(&lock_id);
        Ok(())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<u32, SchedulingError> {
        let mut locks = self.inner.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| !lock.is_expired(now));
        Ok((before - locks.len()) as u32)
    }
}

// ==============================================================================
// PRACTITIONER DIRECTORY
// ==============================================================================

#[derive(Default)]
struct DirectoryData {
    by_type: HashMap<String, Vec<Uuid>>,
    practitioner_settings: HashMap<(Uuid, String), AppointmentTypeSettings>,
    type_defaults: HashMap<String, AppointmentTypeSettings>,
}

#[derive(Default)]
pub struct InMemoryPractitionerDirectory {
    inner: RwLock<DirectoryData>,
}

impl InMemoryPractitionerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_practitioner_for_type(&self, appointment_type_id: &str, practitioner_id: Uuid) {
        self.inner
            .write()
            .await
            .by_type
            .entry(appointment_type_id.to_string())
            .or_default()
            .push(practitioner_id);
    }

    pub async fn set_type_default(&self, settings: AppointmentTypeSettings) {
        self.inner
            .write()
            .await
            .type_defaults
            .insert(settings.appointment_type_id.clone(), settings);
    }

    pub async fn set_practitioner_settings(
        &self,
        practitioner_id: Uuid,
        settings: AppointmentTypeSettings,
    ) {
        self.inner.write().await.practitioner_settings.insert(
            (practitioner_id, settings.appointment_type_id.clone()),
            settings,
        );
    }
}

#[async_trait]
impl PractitionerDirectory for InMemoryPractitionerDirectory {
    async fn practitioners_for_type(
        &self,
        appointment_type_id: &str,
    ) -> Result<Vec<Uuid>, SchedulingError> {
        Ok(self
            .inner
            .read()
            .await
            .by_type
            .get(appointment_type_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn type_settings(
        &self,
        practitioner_id: Uuid,
        appointment_type_id: &str,
    ) -> Result<AppointmentTypeSettings, SchedulingError> {
        let data = self.inner.read().await;
        if let Some(settings) = data
            .practitioner_settings
            .get(&(practitioner_id, appointment_type_id.to_string()))
        {
            return Ok(settings.clone());
        }
        if let Some(settings) = data.type_defaults.get(appointment_type_id) {
            return Ok(settings.clone());
        }
        Ok(AppointmentTypeSettings {
            appointment_type_id: appointment_type_id.to_string(),
            default_duration_minutes: 30,
            buffer_minutes: 0,
        })
    }
}

// ==============================================================================
// NOTIFICATION / AUDIT
// ==============================================================================

/// Captures dispatched events; tests assert on them.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: RwLock<Vec<NotificationEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) {
        self.sent.write().await.push(event);
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.write().await.push(event);
    }
}
