#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoffBuilder;
use bon::Builder;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_secs(3);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_PENDING_CAPACITY: usize = 1024;

/// Configuration for connection manager behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Sub-protocols offered during the opening handshake, passed through unchanged
    #[builder(default)]
    pub protocols: Vec<String>,
    /// Interval for sending `ping` messages while the connection is open
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Upper bound for a single open attempt. `None` waits for the transport indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Maximum number of frames held while disconnected. The oldest frame is
    /// dropped once the limit is reached.
    #[builder(default = DEFAULT_PENDING_CAPACITY)]
    pub pending_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            reconnect: ReconnectConfig::default(),
            connect_timeout: None,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts before giving up
    #[builder(default = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    pub max_attempts: u32,
    /// Delay awaited between a closed connection and the next attempt
    #[builder(default)]
    pub delay: ReconnectDelay,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay: ReconnectDelay::default(),
        }
    }
}

/// How long to wait before each reconnection attempt.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectDelay {
    /// The same delay before every attempt
    Fixed(Duration),
    /// Exponentially growing delay with jitter, capped at `max`
    Exponential {
        /// Delay before the first attempt
        initial: Duration,
        /// Largest delay between attempts
        max: Duration,
        /// Growth factor applied after every attempt
        multiplier: f64,
    },
}

impl Default for ReconnectDelay {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_INTERVAL_DURATION)
    }
}

impl ReconnectDelay {
    /// Build the backoff schedule for this delay policy.
    #[must_use]
    pub fn backoff(self) -> Box<dyn Backoff + Send> {
        match self {
            Self::Fixed(interval) => Box::new(Constant::new(interval)),
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => Box::new(
                ExponentialBackoffBuilder::default()
                    .with_initial_interval(initial)
                    .with_max_interval(max)
                    .with_multiplier(multiplier)
                    .with_max_elapsed_time(None) // We handle max attempts separately
                    .build(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(
            config.reconnect.delay,
            ReconnectDelay::Fixed(Duration::from_secs(3))
        );
        assert_eq!(config.pending_capacity, 1024);
        assert!(config.protocols.is_empty(), "no sub-protocols by default");
        assert!(config.connect_timeout.is_none(), "no connect timeout by default");
    }

    #[test]
    fn builder_matches_default() {
        let built = Config::builder().build();
        let default = Config::default();

        assert_eq!(built.heartbeat_interval, default.heartbeat_interval);
        assert_eq!(built.reconnect.max_attempts, default.reconnect.max_attempts);
        assert_eq!(built.reconnect.delay, default.reconnect.delay);
        assert_eq!(built.pending_capacity, default.pending_capacity);
    }

    #[test]
    fn fixed_delay_is_constant() {
        let mut backoff = ReconnectDelay::Fixed(Duration::from_millis(250)).backoff();

        for _ in 0..10 {
            assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
        }
    }

    #[test]
    fn exponential_backoff_respects_max() {
        let mut backoff = ReconnectDelay::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(2),
            multiplier: 3.0,
        }
        .backoff();

        // Exhaust several iterations
        for _ in 0..10 {
            let _next = backoff.next_backoff();
        }

        // Should still return values capped at max (plus jitter)
        let duration = backoff.next_backoff().unwrap();
        assert!(duration <= Duration::from_secs(3));
    }

    #[test]
    fn exponential_backoff_starts_near_initial() {
        let mut backoff = ReconnectDelay::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
        .backoff();

        // First backoff should be around initial (with some jitter)
        let first = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(500) && first <= Duration::from_millis(1500));
    }
}
