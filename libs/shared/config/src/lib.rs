use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: Option<String>,
    pub policy: SchedulingPolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let redis_url = env::var("REDIS_URL").ok();
        if redis_url.is_none() {
            warn!("REDIS_URL not set, slot locks fall back to in-process storage");
        }

        Self {
            redis_url,
            policy: SchedulingPolicy::from_env(),
        }
    }
}

/// Scheduling tunables, all overridable from the environment.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    /// TTL for a slot hold between selection and booking commit.
    pub slot_lock_ttl_seconds: i64,
    /// Symmetric buffer applied around practitioner appointments when
    /// checking conflicts. Clamped to 0..=30 minutes.
    pub practitioner_buffer_minutes: i64,
    /// Symmetric window for patient cross-practitioner conflicts.
    pub patient_conflict_window_minutes: i64,
    /// Whether a patient conflict blocks booking or is only surfaced.
    pub patient_conflict_blocking: bool,
    /// How far the emergency cascade searches for replacement slots.
    pub cascade_search_horizon_days: i64,
    /// Hard cap on anchor dates walked per series expansion.
    pub max_series_occurrences: u32,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            slot_lock_ttl_seconds: 120,
            practitioner_buffer_minutes: 0,
            patient_conflict_window_minutes: 120,
            patient_conflict_blocking: false,
            cascade_search_horizon_days: 14,
            max_series_occurrences: 104,
        }
    }
}

impl SchedulingPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            slot_lock_ttl_seconds: env_i64("SLOT_LOCK_TTL_SECONDS", defaults.slot_lock_ttl_seconds),
            practitioner_buffer_minutes: env_i64(
                "PRACTITIONER_BUFFER_MINUTES",
                defaults.practitioner_buffer_minutes,
            )
            .clamp(0, 30),
            patient_conflict_window_minutes: env_i64(
                "PATIENT_CONFLICT_WINDOW_MINUTES",
                defaults.patient_conflict_window_minutes,
            ),
            patient_conflict_blocking: env_bool(
                "PATIENT_CONFLICT_BLOCKING",
                defaults.patient_conflict_blocking,
            ),
            cascade_search_horizon_days: env_i64(
                "CASCADE_SEARCH_HORIZON_DAYS",
                defaults.cascade_search_horizon_days,
            ),
            max_series_occurrences: env_i64(
                "MAX_SERIES_OCCURRENCES",
                defaults.max_series_occurrences as i64,
            ) as u32,
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a number, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.as_str() {
            "1" | "true" | "TRUE" | "yes" => true,
            "0" | "false" | "FALSE" | "no" => false,
            _ => {
                warn!("{} is not a boolean, using default {}", key, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_keeps_default_on_garbage() {
        env::set_var("SCHED_TEST_BOOL_FLAG", "maybe");
        assert!(env_bool("SCHED_TEST_BOOL_FLAG", true));
        env::set_var("SCHED_TEST_BOOL_FLAG", "no");
        assert!(!env_bool("SCHED_TEST_BOOL_FLAG", true));
        env::remove_var("SCHED_TEST_BOOL_FLAG");
    }

    #[test]
    fn policy_defaults_are_sane() {
        let policy = SchedulingPolicy::default();
        assert_eq!(policy.slot_lock_ttl_seconds, 120);
        assert_eq!(policy.practitioner_buffer_minutes, 0);
        assert_eq!(policy.patient_conflict_window_minutes, 120);
        assert!(!policy.patient_conflict_blocking);
    }
}
