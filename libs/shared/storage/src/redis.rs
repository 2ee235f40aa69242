//! Redis-backed slot lock store. Acquisition is one atomic conditional write
//! (a Lua script over `SET .. PX` keys), so two clients racing for
//! overlapping intervals can never both win. Expiry is native Redis TTL,
//! which also gives every service instance the same clock for lock lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Pool, Runtime};
use redis::Script;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{SchedulingError, SlotLock, TimeSlot};

use crate::LockStore;

/// Interval coverage is tracked at this granularity; overlapping holds always
/// share at least one granule key.
const GRANULE_SECONDS: i64 = 300;

const ACQUIRE_SCRIPT: &str = r#"
local lock_id = ARGV[1]
local ttl_ms = ARGV[2]
local payload = ARGV[3]
for i = 1, #KEYS - 1 do
    local held = redis.call('GET', KEYS[i])
    if held and held ~= lock_id then
        return 0
    end
end
for i = 1, #KEYS - 1 do
    redis.call('SET', KEYS[i], lock_id, 'PX', ttl_ms)
end
redis.call('SET', KEYS[#KEYS], payload, 'PX', ttl_ms)
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
local lock_id = ARGV[1]
for i = 1, #KEYS - 1 do
    if redis.call('GET', KEYS[i]) == lock_id then
        redis.call('DEL', KEYS[i])
    end
end
redis.call('DEL', KEYS[#KEYS])
return 1
"#;

pub struct RedisLockStore {
    pool: Pool,
    acquire: Script,
    release: Script,
}

impl RedisLockStore {
    pub fn new(config: &AppConfig) -> Result<Self, SchedulingError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| SchedulingError::Storage(format!("Failed to create Redis pool: {}", e)))?;

        Ok(Self {
            pool,
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, SchedulingError> {
        self.pool
            .get()
            .await
            .map_err(|e| SchedulingError::Storage(format!("Redis connection failed: {}", e)))
    }

    fn granule_keys(practitioner_id: Uuid, interval: &TimeSlot) -> Vec<String> {
        let mut keys = Vec::new();
        let mut ts = interval.start.timestamp() / GRANULE_SECONDS * GRANULE_SECONDS;
        while ts < interval.end.timestamp() {
            keys.push(format!("slotlock:{}:{}", practitioner_id, ts));
            ts += GRANULE_SECONDS;
        }
        keys
    }

    fn meta_key(lock_id: Uuid) -> String {
        format!("slotlock:meta:{}", lock_id)
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(
        &self,
        lock: SlotLock,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulingError> {
        let ttl_ms = (lock.expires_at - now).num_milliseconds().max(1);
        let payload = serde_json::to_string(&lock)
            .map_err(|e| SchedulingError::Storage(format!("Lock serialization failed: {}", e)))?;

        let mut invocation = self.acquire.prepare_invoke();
        for key in Self::granule_keys(lock.practitioner_id, &lock.interval) {
            invocation.key(key);
        }
        invocation.key(Self::meta_key(lock.lock_id));
        invocation
            .arg(lock.lock_id.to_string())
            .arg(ttl_ms)
            .arg(payload);

        let mut conn = self.connection().await?;
        let granted: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SchedulingError::Storage(format!("Lock acquire failed: {}", e)))?;

        debug!(
            "Slot lock {} for practitioner {} {}",
            lock.lock_id,
            lock.practitioner_id,
            if granted == 1 { "acquired" } else { "rejected" }
        );
        Ok(granted == 1)
    }

    async fn get(&self, lock_id: Uuid) -> Result<Option<SlotLock>, SchedulingError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::meta_key(lock_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulingError::Storage(format!("Lock lookup failed: {}", e)))?;

        match raw {
            Some(json) => {
                let lock = serde_json::from_str(&json).map_err(|e| {
                    SchedulingError::Storage(format!("Lock deserialization failed: {}", e))
                })?;
                Ok(Some(lock))
            }
            None => Ok(None),
        }
    }

    async fn release(&self, lock_id: Uuid) -> Result<(), SchedulingError> {
        // Absence is fine; the hold may have expired on its own.
        let Some(lock) = self.get(lock_id).await? else {
            return Ok(());
        };

        let mut invocation = self.release.prepare_invoke();
        for key in Self::granule_keys(lock.practitioner_id, &lock.interval) {
            invocation.key(key);
        }
        invocation.key(Self::meta_key(lock_id));
        invocation.arg(lock_id.to_string());

        let mut conn = self.connection().await?;
        let _: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SchedulingError::Storage(format!("Lock release failed: {}", e)))?;
        Ok(())
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Result<u32, SchedulingError> {
        // Redis expires lock keys natively; nothing to collect here.
        Ok(0)
    }
}
