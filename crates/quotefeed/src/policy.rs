//! Reconnection policy
//!
//! Two retry paths share one counter-bearing state machine:
//!
//! - Transport failures back off exponentially (`base * 2^(n-1)`, capped at
//!   `max_delay`) and give up once the consecutive failure count exceeds
//!   `max_attempts`.
//! - Clean server-initiated closes retry after a fixed delay, forever, and
//!   never touch the failure counter.
//!
//! A successful open resets the counter.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry after a failure.
    pub base_delay: Duration,
    /// Upper bound for the exponential delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
    /// Fixed delay before reopening after a clean close.
    pub clean_close_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
            clean_close_delay: Duration::from_millis(2000),
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The server ended the session without error.
    ClosedCleanly,
    /// The open failed or the transport errored; carries the error text.
    Failed(String),
}

/// What to do after a connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reopen after an exponential delay; `attempt` is the failure count.
    Backoff { attempt: u32, delay: Duration },
    /// Reopen after the fixed clean-close delay.
    Resume { delay: Duration },
    /// Budget exhausted; `attempts` consecutive failures were seen.
    GiveUp { attempts: u32 },
}

#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Decide the next step after a connection ended.
    pub fn on_disconnect(&mut self, reason: &Disconnect) -> RetryDecision {
        match reason {
            Disconnect::ClosedCleanly => RetryDecision::Resume {
                delay: self.config.clean_close_delay,
            },
            Disconnect::Failed(_) => {
                self.attempt_count = self.attempt_count.saturating_add(1);
                if self.attempt_count > self.config.max_attempts {
                    RetryDecision::GiveUp {
                        attempts: self.attempt_count,
                    }
                } else {
                    RetryDecision::Backoff {
                        attempt: self.attempt_count,
                        delay: self.backoff_delay(self.attempt_count),
                    }
                }
            }
        }
    }

    /// Delay for the given 1-based failure count: `min(base * 2^(n-1), max)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    /// Reset after a successful open.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> Disconnect {
        Disconnect::Failed("connection reset".to_string())
    }

    fn backoff_delay_ms(decision: RetryDecision) -> u128 {
        match decision {
            RetryDecision::Backoff { delay, .. } => delay.as_millis(),
            other => panic!("Expected Backoff, got {:?}", other),
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.clean_close_delay, Duration::from_secs(2));
    }

    #[test]
    fn exponential_backoff_with_cap() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        let delays: Vec<u128> = (0..8)
            .map(|_| backoff_delay_ms(policy.on_disconnect(&failed())))
            .collect();

        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(policy.attempt_count(), 8);
    }

    #[test]
    fn backoff_delay_does_not_overflow() {
        let policy = ReconnectPolicy::new(ReconnectConfig::default());
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn gives_up_after_exceeding_max_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 3,
            ..Default::default()
        });

        for attempt in 1..=3 {
            match policy.on_disconnect(&failed()) {
                RetryDecision::Backoff { attempt: a, .. } => assert_eq!(a, attempt),
                other => panic!("Expected Backoff, got {:?}", other),
            }
        }

        assert_eq!(
            policy.on_disconnect(&failed()),
            RetryDecision::GiveUp { attempts: 4 }
        );
    }

    #[test]
    fn reset_restarts_at_base_delay() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        let _ = policy.on_disconnect(&failed());
        let _ = policy.on_disconnect(&failed());
        let _ = policy.on_disconnect(&failed());
        assert_eq!(policy.attempt_count(), 3);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(backoff_delay_ms(policy.on_disconnect(&failed())), 1000);
    }

    #[test]
    fn clean_close_does_not_consume_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        assert_eq!(backoff_delay_ms(policy.on_disconnect(&failed())), 1000);

        assert_eq!(
            policy.on_disconnect(&Disconnect::ClosedCleanly),
            RetryDecision::Resume {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(policy.attempt_count(), 1);

        assert_eq!(backoff_delay_ms(policy.on_disconnect(&failed())), 2000);
        assert_eq!(policy.attempt_count(), 2);
    }

    #[test]
    fn clean_closes_retry_forever() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 1,
            ..Default::default()
        });

        for _ in 0..1000 {
            assert!(matches!(
                policy.on_disconnect(&Disconnect::ClosedCleanly),
                RetryDecision::Resume { .. }
            ));
        }
        assert_eq!(policy.attempt_count(), 0);
    }

    #[test]
    fn zero_max_attempts_gives_up_on_first_failure() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        });

        assert_eq!(
            policy.on_disconnect(&failed()),
            RetryDecision::GiveUp { attempts: 1 }
        );
    }
}
