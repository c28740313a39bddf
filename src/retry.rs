//! Retry policies for failed transport attempts
//!
//! A retry policy is a pure function from `(url, failure signal, attempt index)`
//! to a [`RetryDecision`]. Policies hold configuration only, so a single
//! instance can be shared read-only by every request of a loader.

use std::fmt;
use std::time::Duration;

use crate::config::RetryConfig;

/// Classification of a failed transport attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// A response arrived with a non-success status code
    Status(u16),
    /// A neutral zero status outside a headless context, or a local read failure
    ZeroStatus,
    /// No response: the connection failed or was reset
    Network(String),
    /// No response within the request timeout
    Timeout,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Status(code) => write!(f, "HTTP {}", code),
            FailureClass::ZeroStatus => write!(f, "status 0"),
            FailureClass::Network(msg) => write!(f, "network error: {}", msg),
            FailureClass::Timeout => write!(f, "timeout"),
        }
    }
}

/// Everything a policy may inspect about a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FailureSignal {
    /// What went wrong
    pub class: FailureClass,
    /// Whether the url targets a local-file scheme
    pub local_scheme: bool,
    /// Time since the first attempt of the request started
    pub elapsed: Duration,
}

impl FailureSignal {
    /// Build a signal for a failure on `url`
    pub fn new(class: FailureClass, url: &str, elapsed: Duration) -> Self {
        Self {
            class,
            local_scheme: is_local_scheme(url),
            elapsed,
        }
    }
}

/// Why a policy stopped retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// Local resources cannot be retried meaningfully
    LocalResource,
    /// Zero-status failures are not retried
    ZeroStatus,
    /// `max_retries` reached
    Exhausted,
    /// Overall deadline passed
    Deadline,
    /// Retrying is switched off
    Disabled,
}

/// Outcome of a retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Start a new attempt after this delay
    Wait(Duration),
    /// Stop and surface the failure
    GiveUp(GiveUpReason),
}

/// Decides whether a failed attempt is retried
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Decide what to do after attempt `attempt_index` failed with `signal`
    fn decide(&self, url: &str, signal: &FailureSignal, attempt_index: u32) -> RetryDecision;
}

/// Returns true when `url` points at a local-file scheme
pub fn is_local_scheme(url: &str) -> bool {
    url.contains("file:")
}

/// Exponential backoff: `2^attempt * base_interval`, up to `max_retries` retries
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    max_retries: u32,
    base_interval: Duration,
}

impl ExponentialBackoff {
    /// Create a policy with the given limits
    pub fn new(max_retries: u32, base_interval: Duration) -> Self {
        Self {
            max_retries,
            base_interval,
        }
    }

    /// Maximum number of retries after the initial attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry
    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Calculate the delay before retry number `attempt_index + 1`
    pub fn calculate_backoff(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.base_interval.saturating_mul(factor)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn decide(&self, url: &str, signal: &FailureSignal, attempt_index: u32) -> RetryDecision {
        if signal.local_scheme || is_local_scheme(url) {
            return RetryDecision::GiveUp(GiveUpReason::LocalResource);
        }
        match signal.class {
            FailureClass::ZeroStatus => RetryDecision::GiveUp(GiveUpReason::ZeroStatus),
            FailureClass::Status(_) | FailureClass::Network(_) | FailureClass::Timeout => {
                if attempt_index >= self.max_retries {
                    RetryDecision::GiveUp(GiveUpReason::Exhausted)
                } else {
                    RetryDecision::Wait(self.calculate_backoff(attempt_index))
                }
            }
        }
    }
}

/// Never retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn decide(&self, _url: &str, _signal: &FailureSignal, _attempt_index: u32) -> RetryDecision {
        RetryDecision::GiveUp(GiveUpReason::Disabled)
    }
}

/// Wraps a policy and gives up once the request has run past a deadline
#[derive(Debug, Clone)]
pub struct WithDeadline<P> {
    inner: P,
    deadline: Duration,
}

impl<P: RetryPolicy> WithDeadline<P> {
    /// Wrap `inner`, giving up when `signal.elapsed >= deadline`
    pub fn new(inner: P, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

impl<P: RetryPolicy> RetryPolicy for WithDeadline<P> {
    fn decide(&self, url: &str, signal: &FailureSignal, attempt_index: u32) -> RetryDecision {
        if signal.elapsed >= self.deadline {
            return RetryDecision::GiveUp(GiveUpReason::Deadline);
        }
        match self.inner.decide(url, signal, attempt_index) {
            // Don't sleep past the deadline just to give up afterwards
            RetryDecision::Wait(wait) if signal.elapsed + wait > self.deadline => {
                RetryDecision::GiveUp(GiveUpReason::Deadline)
            }
            decision => decision,
        }
    }
}

impl From<&RetryConfig> for ExponentialBackoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_interval_ms),
        )
    }
}
