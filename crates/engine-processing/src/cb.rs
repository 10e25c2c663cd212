use engine_core::settings::ReconnectSettings;
use std::time::Duration;

/// Tracks consecutive failed write attempts for one writer. Any progress
/// (rows committed or found committed) resets it.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    settings: ReconnectSettings,
    consecutive_failures: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitBreakerState {
    RetryAfter(Duration),
    Open,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::from_settings(&ReconnectSettings {
            threshold,
            base_delay,
            max_delay,
        })
    }

    /// A zero `max_delay` caps the backoff at `base_delay`.
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        let mut settings = *settings;
        settings.threshold = settings.threshold.max(1);
        if settings.max_delay.is_zero() {
            settings.max_delay = settings.base_delay;
        }
        Self {
            settings,
            consecutive_failures: 0,
        }
    }

    pub fn record_failure(&mut self) -> CircuitBreakerState {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.settings.threshold {
            return CircuitBreakerState::Open;
        }
        CircuitBreakerState::RetryAfter(self.backoff())
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    // Doubles per failure, at most 64x the base delay.
    fn backoff(&self) -> Duration {
        let doublings = self.consecutive_failures.saturating_sub(1).min(6);
        self.settings
            .base_delay
            .saturating_mul(1 << doublings)
            .min(self.settings.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let mut cb = CircuitBreaker::new(3, Duration::from_millis(10), Duration::from_millis(15));
        assert_eq!(
            cb.record_failure(),
            CircuitBreakerState::RetryAfter(Duration::from_millis(10))
        );
        assert_eq!(
            cb.record_failure(),
            CircuitBreakerState::RetryAfter(Duration::from_millis(15))
        );
        assert_eq!(cb.record_failure(), CircuitBreakerState::Open);
    }

    #[test]
    fn progress_resets_the_count() {
        let mut cb = CircuitBreaker::new(2, Duration::ZERO, Duration::ZERO);
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.record_failure(), CircuitBreakerState::RetryAfter(Duration::ZERO));
    }
}
