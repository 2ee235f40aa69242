use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::SchedulingPolicy;
use shared_models::{AuditAction, AuditEvent, SchedulingError, SlotLock, TimeSlot};
use shared_storage::{AuditSink, Clock, LockStore};

/// Issues short-lived exclusive holds on (practitioner, interval) pairs to
/// bridge the gap between slot selection and booking commit. Holds expire on
/// their own; acquisition fails fast instead of queuing.
pub struct SlotLockManager {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    ttl: Duration,
}

impl SlotLockManager {
    pub fn new(
        store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        policy: &SchedulingPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            ttl: Duration::seconds(policy.slot_lock_ttl_seconds),
        }
    }

    /// Acquire a hold, or renew when `requested_lock_id` names a lock that is
    /// still valid for the same interval (idempotent re-acquire). Fails with
    /// `Conflict` if an unexpired hold under another id overlaps.
    pub async fn acquire(
        &self,
        practitioner_id: Uuid,
        interval: TimeSlot,
        requested_lock_id: Option<Uuid>,
    ) -> Result<SlotLock, SchedulingError> {
        let now = self.clock.now();
        let lock = SlotLock {
            lock_id: requested_lock_id.unwrap_or_else(Uuid::new_v4),
            practitioner_id,
            interval,
            expires_at: now + self.ttl,
        };

        let granted = self.store.try_acquire(lock.clone(), now).await?;
        if !granted {
            self.audit
                .record(AuditEvent {
                    occurred_at: now,
                    action: AuditAction::LockConflict,
                    appointment_id: None,
                    practitioner_id: Some(practitioner_id),
                    actor: None,
                    detail: Some(format!("interval {} - {}", interval.start, interval.end)),
                })
                .await;
            return Err(SchedulingError::Conflict);
        }

        debug!(
            "Slot hold {} acquired for practitioner {} until {}",
            lock.lock_id, practitioner_id, lock.expires_at
        );
        self.audit
            .record(AuditEvent {
                occurred_at: now,
                action: AuditAction::LockAcquired,
                appointment_id: None,
                practitioner_id: Some(practitioner_id),
                actor: None,
                detail: Some(lock.lock_id.to_string()),
            })
            .await;
        Ok(lock)
    }

    /// True only for an unexpired hold with this id over exactly this
    /// practitioner/interval. Run immediately before the booking write.
    pub async fn verify(
        &self,
        practitioner_id: Uuid,
        interval: TimeSlot,
        lock_id: Uuid,
    ) -> Result<bool, SchedulingError> {
        let now = self.clock.now();
        let Some(lock) = self.store.get(lock_id).await? else {
            return Ok(false);
        };
        Ok(!lock.is_expired(now)
            && lock.practitioner_id == practitioner_id
            && lock.interval == interval)
    }

    /// Best-effort; an already-expired or missing hold is not an error.
    pub async fn release(&self, lock_id: Uuid) -> Result<(), SchedulingError> {
        self.store.release(lock_id).await?;
        self.audit
            .record(AuditEvent {
                occurred_at: self.clock.now(),
                action: AuditAction::LockReleased,
                appointment_id: None,
                practitioner_id: None,
                actor: None,
                detail: Some(lock_id.to_string()),
            })
            .await;
        Ok(())
    }

    /// Janitor entry point; idempotent and safe to run concurrently.
    pub async fn sweep(&self) -> Result<u32, SchedulingError> {
        let swept = self.store.sweep(self.clock.now()).await?;
        if swept > 0 {
            info!("Swept {} expired slot holds", swept);
        }
        Ok(swept)
    }
}
