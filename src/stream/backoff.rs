use crate::config::ConnectionSettings;
use std::time::Duration;

/// Exponential backoff schedule for reconnect attempts
///
/// Attempt `k` (1-indexed) waits `min(cap, base * 2^(k-1))`. The attempt
/// counter is owned by the connection manager and resets to zero on every
/// successful connection.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            cap: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            base: Duration::from_millis(settings.base_delay_ms),
            cap: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .base
            .checked_mul(1u32 << (attempt.saturating_sub(1)).min(31))
            .unwrap_or(self.cap);
        doubled.min(self.cap)
    }

    /// True once `attempt` exceeds the configured maximum
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_sequence_is_doubling_and_capped() {
        let policy = BackoffPolicy::default();

        let delays: Vec<u64> = (1..=10)
            .map(|k| policy.delay_for(k).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_exhaustion_boundary() {
        let policy = BackoffPolicy::default();
        assert!(!policy.exhausted(10));
        assert!(policy.exhausted(11));
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_from_settings() {
        let settings = ConnectionSettings {
            base_delay_ms: 500,
            max_delay_ms: 4_000,
            max_attempts: 3,
            connect_timeout_ms: 1_000,
        };
        let policy = BackoffPolicy::from_settings(&settings);

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(4_000));
        assert!(policy.exhausted(4));
    }
}
