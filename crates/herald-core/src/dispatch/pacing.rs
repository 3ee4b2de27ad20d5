//! Send pacing policy
//!
//! The gateway enforces a per-account protection window, and violating it
//! draws penalties well beyond one failed send. The policy never waits less
//! than the documented floor, randomizes the normal interval so the cadence
//! does not look machine-generated, and inserts a longer cool-down break
//! every `messages_before_break` sends.

use std::time::Duration;

use herald_common::DispatchSettings;
use rand::Rng;

/// Gateway-documented minimum interval between sends, in milliseconds.
/// Configuration can lengthen the wait, never shorten it.
pub const MIN_SEND_INTERVAL_MS: u64 = 5_000;

/// Margin added to the floor when retrying after a rate-limit rejection
/// without a gateway-supplied hint
const RATE_LIMIT_RETRY_MARGIN_MS: u64 = 250;

/// Cap applied to gateway retry hints so a hostile reply cannot stall a
/// campaign indefinitely
const MAX_RETRY_AFTER_SECS: u64 = 120;

/// Computes the wait before each send
#[derive(Debug, Clone)]
pub struct PacingPolicy {
    base_ms: u64,
    jitter_ms: u64,
    messages_before_break: u32,
    break_ms: u64,
}

impl PacingPolicy {
    /// Build a policy from campaign settings, clamping to the gateway floor
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        let base_ms = settings.delay_between_messages_ms.max(MIN_SEND_INTERVAL_MS);
        let jitter_ms = if settings.jitter_ms > 0 {
            settings.jitter_ms
        } else {
            // Unconfigured jitter still gets a bounded random window.
            (base_ms / 4).clamp(250, 1_500)
        };

        Self {
            base_ms,
            jitter_ms,
            messages_before_break: settings.messages_before_break,
            break_ms: settings.break_duration_ms.max(MIN_SEND_INTERVAL_MS),
        }
    }

    /// Wait before the send at zero-based position `index` in the
    /// campaign's global send sequence
    pub fn delay_for<R: Rng>(&self, index: u64, rng: &mut R) -> Duration {
        if self.is_break_index(index) {
            return Duration::from_millis(self.break_ms);
        }

        let wait_ms = rng.gen_range(self.base_ms..=self.base_ms + self.jitter_ms);
        Duration::from_millis(wait_ms)
    }

    /// Whether `index` lands on a cool-down break
    pub fn is_break_index(&self, index: u64) -> bool {
        self.messages_before_break > 0
            && index > 0
            && index % u64::from(self.messages_before_break) == 0
    }

    /// Wait before the single retry after a rate-limit rejection
    pub fn rate_limit_wait(&self, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)),
            None => Duration::from_millis(MIN_SEND_INTERVAL_MS + RATE_LIMIT_RETRY_MARGIN_MS),
        }
    }

    /// Base delay in milliseconds, used for completion estimates
    pub fn base_ms(&self) -> u64 {
        self.base_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(delay: u64, jitter: u64, before_break: u32, break_ms: u64) -> DispatchSettings {
        DispatchSettings {
            delay_between_messages_ms: delay,
            jitter_ms: jitter,
            messages_before_break: before_break,
            break_duration_ms: break_ms,
            ..DispatchSettings::default()
        }
    }

    #[test]
    fn test_delay_never_below_floor() {
        let policy = PacingPolicy::from_settings(&settings(1000, 0, 20, 2000));
        let mut rng = StdRng::seed_from_u64(7);

        for index in 0..200 {
            let delay = policy.delay_for(index, &mut rng);
            assert!(
                delay >= Duration::from_millis(MIN_SEND_INTERVAL_MS),
                "delay {:?} below floor at index {}",
                delay,
                index
            );
        }
    }

    #[test]
    fn test_jitter_stays_within_configured_window() {
        let policy = PacingPolicy::from_settings(&settings(5200, 800, 0, 10_000));
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let delay = policy.delay_for(1, &mut rng);
            assert!(delay >= Duration::from_millis(5200));
            assert!(delay <= Duration::from_millis(6000));
        }
    }

    #[test]
    fn test_unconfigured_jitter_is_derived_and_bounded() {
        let policy = PacingPolicy::from_settings(&settings(6000, 0, 0, 10_000));
        let mut rng = StdRng::seed_from_u64(42);

        // base / 4 = 1500, the derived cap.
        for _ in 0..500 {
            let delay = policy.delay_for(1, &mut rng);
            assert!(delay >= Duration::from_millis(6000));
            assert!(delay <= Duration::from_millis(7500));
        }
    }

    #[test]
    fn test_break_periodicity() {
        let policy = PacingPolicy::from_settings(&settings(5200, 800, 2, 10_000));

        assert!(!policy.is_break_index(0));
        assert!(!policy.is_break_index(1));
        assert!(policy.is_break_index(2));
        assert!(!policy.is_break_index(3));
        assert!(policy.is_break_index(4));

        // Exactly floor(k / b) breaks over a k-message campaign.
        let k = 9u64;
        let breaks = (0..k).filter(|i| policy.is_break_index(*i)).count();
        assert_eq!(breaks, 4);
    }

    #[test]
    fn test_break_duration_respects_floor() {
        let policy = PacingPolicy::from_settings(&settings(5200, 800, 2, 1000));
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(
            policy.delay_for(2, &mut rng),
            Duration::from_millis(MIN_SEND_INTERVAL_MS)
        );
    }

    #[test]
    fn test_configured_break_duration_used() {
        let policy = PacingPolicy::from_settings(&settings(5200, 800, 2, 10_000));
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(policy.delay_for(2, &mut rng), Duration::from_millis(10_000));
    }

    #[test]
    fn test_rate_limit_wait() {
        let policy = PacingPolicy::from_settings(&settings(5200, 800, 2, 10_000));

        assert_eq!(policy.rate_limit_wait(Some(7)), Duration::from_secs(7));
        assert_eq!(
            policy.rate_limit_wait(None),
            Duration::from_millis(MIN_SEND_INTERVAL_MS + 250)
        );
        assert_eq!(
            policy.rate_limit_wait(Some(10_000)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_zero_break_interval_disables_breaks() {
        let policy = PacingPolicy::from_settings(&settings(5200, 800, 0, 10_000));
        assert!((0..100).all(|i| !policy.is_break_index(i)));
    }
}
