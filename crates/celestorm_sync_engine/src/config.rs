//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// How the engine treats rounds that skip ahead of the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Any round after the last committed one is accepted.
    ///
    /// Suits transports whose round numbers advance in non-unit steps.
    #[default]
    Permit,
    /// A package must land exactly on `last + 1`, or on the round announced
    /// by the transport's last gap signal. Anything else halts the engine.
    RequireSignal,
}

/// Configuration for a sync engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Round-skipping policy.
    pub gap_policy: GapPolicy,
    /// Reject packages that carry no valid signature.
    pub require_signatures: bool,
    /// Halt instead of rejecting when a package is malformed.
    pub malformed_is_fatal: bool,
    /// Halt instead of returning an error when the transport disconnects.
    pub halt_on_disconnect: bool,
    /// Advance the persisted cursor past rejected rounds.
    pub persist_rejected_rounds: bool,
    /// Retry policy for store failures the backend declares retry-safe.
    pub apply_retry: RetryConfig,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            gap_policy: GapPolicy::Permit,
            require_signatures: false,
            malformed_is_fatal: false,
            halt_on_disconnect: false,
            persist_rejected_rounds: true,
            apply_retry: RetryConfig::no_retry(),
        }
    }

    /// Sets the gap policy.
    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// Requires every package to be signed by a trusted key.
    pub fn with_required_signatures(mut self, required: bool) -> Self {
        self.require_signatures = required;
        self
    }

    /// Treats malformed packages as fatal.
    pub fn with_malformed_fatal(mut self, fatal: bool) -> Self {
        self.malformed_is_fatal = fatal;
        self
    }

    /// Halts the engine when the transport disconnects.
    pub fn with_halt_on_disconnect(mut self, halt: bool) -> Self {
        self.halt_on_disconnect = halt;
        self
    }

    /// Sets whether rejected rounds advance the persisted cursor.
    pub fn with_persist_rejected_rounds(mut self, persist: bool) -> Self {
        self.persist_rejected_rounds = persist;
        self
    }

    /// Sets the store retry configuration.
    pub fn with_apply_retry(mut self, retry: RetryConfig) -> Self {
        self.apply_retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Number of attempts actually made; never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.gap_policy, GapPolicy::Permit);
        assert!(!config.require_signatures);
        assert!(!config.malformed_is_fatal);
        assert!(!config.halt_on_disconnect);
        assert!(config.persist_rejected_rounds);
        assert_eq!(config.apply_retry.attempts(), 1);
    }

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new()
            .with_gap_policy(GapPolicy::RequireSignal)
            .with_required_signatures(true)
            .with_malformed_fatal(true)
            .with_halt_on_disconnect(true)
            .with_persist_rejected_rounds(false)
            .with_apply_retry(RetryConfig::new(4));

        assert_eq!(config.gap_policy, GapPolicy::RequireSignal);
        assert!(config.require_signatures);
        assert!(config.malformed_is_fatal);
        assert!(config.halt_on_disconnect);
        assert!(!config.persist_rejected_rounds);
        assert_eq!(config.apply_retry.max_attempts, 4);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryConfig::new(0).attempts(), 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(2.0);

        // First attempt has no delay
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
