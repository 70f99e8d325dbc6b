use std::time::Duration;

use crate::LimiterError;

const DEFAULT_WINDOW_SIZE: Duration = Duration::from_secs(10);
const DEFAULT_MAX_REQUESTS: usize = 1;
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Settings for a [`SlidingWindowLimiter`](crate::SlidingWindowLimiter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowConfig {
    /// Length of the trailing window.
    pub window_size: Duration,
    /// Admissions allowed per identity within one window.
    pub max_requests: usize,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl SlidingWindowConfig {
    /// Creates a new `SlidingWindowConfig`.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - The maximum number of admissions per identity within a window.
    /// * `window_size` - The duration of the trailing window.
    pub fn new(max_requests: usize, window_size: Duration) -> Self {
        Self {
            window_size,
            max_requests,
        }
    }

    /// Rejects a zero window or a zero quota.
    pub fn validate(&self) -> Result<(), LimiterError> {
        if self.window_size.is_zero() {
            return Err(LimiterError::invalid("window_size", "must be non-zero"));
        }
        if self.max_requests == 0 {
            return Err(LimiterError::invalid("max_requests", "must be non-zero"));
        }
        Ok(())
    }
}

/// Settings for an [`IntervalThrottle`](crate::IntervalThrottle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalThrottleConfig {
    /// Minimum gap between two admissions for the same identity.
    pub min_interval: Duration,
    /// How long an idle identity is remembered before a sweep may drop it.
    ///
    /// `None` disables opportunistic sweeping entirely.
    pub retention: Option<Duration>,
}

impl Default for IntervalThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            retention: None,
        }
    }
}

impl IntervalThrottleConfig {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            retention: None,
        }
    }

    /// Enable opportunistic sweeping of identities idle for at least `retention`.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Rejects a zero interval, or a retention that would forget an identity
    /// while it is still throttled.
    pub fn validate(&self) -> Result<(), LimiterError> {
        if self.min_interval.is_zero() {
            return Err(LimiterError::invalid("min_interval", "must be non-zero"));
        }
        if let Some(retention) = self.retention
            && retention < self.min_interval
        {
            return Err(LimiterError::invalid(
                "retention",
                "must not be shorter than min_interval",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_defaults_to_one_event_per_ten_seconds() {
        let window = SlidingWindowConfig::default();
        assert_eq!(window.window_size, Duration::from_secs(10));
        assert_eq!(window.max_requests, 1);
        assert!(window.validate().is_ok());

        let throttle = IntervalThrottleConfig::default();
        assert_eq!(throttle.min_interval, Duration::from_secs(10));
        assert_eq!(throttle.retention, None);
        assert!(throttle.validate().is_ok());
    }

    #[test]
    fn it_rejects_degenerate_sliding_windows() {
        let err = SlidingWindowConfig::new(0, Duration::from_secs(1))
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            LimiterError::InvalidConfiguration {
                field: "max_requests",
                reason: "must be non-zero"
            }
        );

        let err = SlidingWindowConfig::new(5, Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            LimiterError::InvalidConfiguration {
                field: "window_size",
                ..
            }
        ));
    }

    #[test]
    fn it_rejects_degenerate_throttles() {
        assert!(IntervalThrottleConfig::new(Duration::ZERO).validate().is_err());

        let short_retention = IntervalThrottleConfig::new(Duration::from_secs(10))
            .with_retention(Duration::from_secs(5));
        let err = short_retention.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: `retention` must not be shorter than min_interval"
        );

        let ok = IntervalThrottleConfig::new(Duration::from_secs(10))
            .with_retention(Duration::from_secs(10));
        assert!(ok.validate().is_ok());
    }
}
