use std::time::Duration;

/// Exponential backoff used by the real-time channel's reconnect loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms: base_delay_ms.max(1),
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1_u64 << attempt.min(20);
        let bounded = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            convoy_shared::constants::RECONNECT_BASE_DELAY_MS,
            convoy_shared::constants::RECONNECT_MAX_DELAY_MS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_base_delay() {
        let policy = RetryPolicy::new(250, 8_000);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
    }

    #[test]
    fn scales_exponentially_and_caps() {
        let policy = RetryPolicy::new(100, 1_000);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(1_000));
    }
}
