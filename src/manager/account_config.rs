// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account configuration types.

use std::time::Duration;

use rand::Rng;

use crate::region::Endpoints;

/// Configuration for one cloud account.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dreo_lib::manager::{AccountConfig, DispatchConfig, ReconnectionPolicy};
///
/// // Defaults for everything but the token
/// let config = AccountConfig::new("token:EU");
///
/// // Tuned for a flaky network
/// let config = AccountConfig::new("token")
///     .with_request_timeout(Duration::from_secs(5))
///     .with_reconnection(ReconnectionPolicy::new().with_max_retries(20))
///     .with_dispatch(DispatchConfig::default().with_coalesce_window(Duration::from_millis(500)));
/// ```
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Account token, optionally suffixed with `:EU` or `:NA`.
    pub token: String,
    /// Endpoint override; the region's defaults are used when `None`.
    pub endpoints: Option<Endpoints>,
    /// Timeout of every REST call.
    pub request_timeout: Duration,
    /// Timeout of a push channel connection attempt.
    pub connect_timeout: Duration,
    /// Push channel reconnection policy.
    pub reconnection: ReconnectionPolicy,
    /// Command send retry policy.
    pub retry: RetryPolicy,
    /// Command dispatch timing.
    pub dispatch: DispatchConfig,
    /// Fallback polling.
    pub poll: PollConfig,
    /// Interval between pings on the push channel.
    pub heartbeat_interval: Duration,
    /// Silence on the push channel after which it is considered lost.
    pub heartbeat_timeout: Duration,
    /// Capacity of the bounded queue between telemetry producers and the store.
    pub telemetry_queue_capacity: usize,
    /// Capacity of the device event bus.
    pub event_capacity: usize,
}

impl AccountConfig {
    /// Default REST request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default push connection timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default heartbeat interval.
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
    /// Default heartbeat timeout.
    pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(45);
    /// Default telemetry queue capacity.
    pub const DEFAULT_TELEMETRY_QUEUE_CAPACITY: usize = 256;

    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoints: None,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            reconnection: ReconnectionPolicy::default(),
            retry: RetryPolicy::default(),
            dispatch: DispatchConfig::default(),
            poll: PollConfig::default(),
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: Self::DEFAULT_HEARTBEAT_TIMEOUT,
            telemetry_queue_capacity: Self::DEFAULT_TELEMETRY_QUEUE_CAPACITY,
            event_capacity: crate::event::DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Overrides the regional endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Sets the REST request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the push connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Sets the command retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the dispatch timing.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Sets the fallback polling configuration.
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the heartbeat interval and timeout.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the telemetry queue capacity.
    #[must_use]
    pub fn with_telemetry_queue_capacity(mut self, capacity: usize) -> Self {
        self.telemetry_queue_capacity = capacity.max(1);
        self
    }

    /// Sets the event bus capacity.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Configuration for automatic push channel reconnection.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dreo_lib::manager::ReconnectionPolicy;
///
/// // Default policy (enabled with exponential backoff and jitter)
/// let policy = ReconnectionPolicy::default();
///
/// // Disable reconnection
/// let policy = ReconnectionPolicy::disabled();
///
/// // Custom policy
/// let policy = ReconnectionPolicy::new()
///     .with_max_retries(5)
///     .with_initial_delay(Duration::from_millis(500))
///     .with_max_delay(Duration::from_secs(30))
///     .with_jitter(0.0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,
    /// Maximum number of retries before giving up (None = infinite).
    pub max_retries: Option<u32>,
    /// Initial delay between retry attempts.
    pub initial_delay: Duration,
    /// Maximum delay between retry attempts (for exponential backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,
    /// Upper bound of the random extra delay, as a fraction of the delay.
    pub jitter: f32,
}

impl ReconnectionPolicy {
    /// Creates a new reconnection policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a disabled reconnection policy.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets infinite retries.
    #[must_use]
    pub fn with_infinite_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Sets the initial delay between retry attempts.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retry attempts.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Calculates the delay for a given retry attempt, without jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff_delay(
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            attempt,
        )
    }

    /// Calculates the delay for a retry attempt with random jitter added.
    ///
    /// The result stays within `[delay, delay * (1 + jitter)]` and never
    /// exceeds `max_delay`.
    #[must_use]
    pub fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let fraction = rand::thread_rng().gen_range(0.0..=f64::from(self.jitter));
        (base + base.mul_f64(fraction)).min(self.max_delay.max(base))
    }

    /// Returns true if another retry should be attempted.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && self.max_retries.is_none_or(|max| attempt < max)
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: Some(10),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

/// Bounded retry of command sends on transient network failures.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dreo_lib::manager::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 3);
/// assert!(policy.should_retry(2));
/// assert!(!policy.should_retry(3));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of send attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,
}

impl RetryPolicy {
    /// Creates a policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the total number of attempts (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Returns the delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        backoff_delay(
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            retry,
        )
    }

    /// Returns true if attempt number `attempts_made + 1` is allowed.
    #[must_use]
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

/// Command dispatch timing.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Window during which successive values for one attribute coalesce.
    pub coalesce_window: Duration,
    /// How long an acknowledged command waits for confirming telemetry.
    pub confirmation_timeout: Duration,
    /// Timeout of one send attempt.
    pub send_timeout: Duration,
}

impl DispatchConfig {
    /// Sets the coalescing window.
    #[must_use]
    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    /// Sets the confirmation timeout.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Sets the per-attempt send timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(300),
            confirmation_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Fallback polling while the push channel is down.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Whether fallback polling runs at all.
    pub enabled: bool,
    /// Interval between polls.
    pub interval: Duration,
    /// How long the push channel must be down before polling starts.
    pub grace: Duration,
}

impl PollConfig {
    /// Creates a disabled polling configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the grace period.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
            grace: Duration::from_secs(30),
        }
    }
}

fn backoff_delay(initial: Duration, max: Duration, multiplier: f32, attempt: u32) -> Duration {
    if attempt == 0 {
        return initial.min(max);
    }

    let multiplier = multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));

    // Delays are seconds or minutes, far from f32 precision limits.
    #[allow(clippy::cast_precision_loss)]
    let delay_ms = initial.as_millis() as f32 * multiplier;

    if !delay_ms.is_finite() {
        return max;
    }

    // Non-negative since both factors are.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let delay = Duration::from_millis(delay_ms as u64);

    delay.min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_config_defaults() {
        let config = AccountConfig::new("abc:EU");

        assert_eq!(config.token, "abc:EU");
        assert!(config.endpoints.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.dispatch.coalesce_window, Duration::from_millis(300));
        assert_eq!(config.dispatch.confirmation_timeout, Duration::from_secs(10));
        assert_eq!(config.poll.interval, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn account_config_builders() {
        let config = AccountConfig::new("abc")
            .with_endpoints(Endpoints::new("http://localhost:1", "ws://localhost:2"))
            .with_heartbeat(Duration::from_secs(1), Duration::from_secs(3))
            .with_telemetry_queue_capacity(0)
            .with_poll(PollConfig::disabled());

        assert_eq!(config.endpoints.unwrap().api_base, "http://localhost:1");
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(3));
        assert_eq!(config.telemetry_queue_capacity, 1);
        assert!(!config.poll.enabled);
    }

    #[test]
    fn reconnection_policy_disabled() {
        let policy = ReconnectionPolicy::disabled();

        assert!(!policy.enabled);
        assert!(!policy.should_retry(0));
    }

    #[test]
    fn reconnection_delay_calculation() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        // Capped at max_delay
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(200), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(0.25);

        for _ in 0..50 {
            let delay = policy.jittered_delay_for_attempt(1);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn jitter_never_exceeds_max_delay() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_jitter(1.0);

        for _ in 0..50 {
            assert!(policy.jittered_delay_for_attempt(10) <= Duration::from_secs(3));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = ReconnectionPolicy::new().with_jitter(0.0);
        assert_eq!(
            policy.jittered_delay_for_attempt(2),
            policy.delay_for_attempt(2)
        );
    }

    #[test]
    fn reconnection_should_retry() {
        let policy = ReconnectionPolicy::new().with_max_retries(3);

        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(
            ReconnectionPolicy::new()
                .with_infinite_retries()
                .should_retry(1000)
        );
    }

    #[test]
    fn retry_policy_bounds_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(400));

        assert!(!RetryPolicy::none().should_retry(1));
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
    }
}
