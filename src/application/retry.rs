//! Bounded retries with exponential backoff and jitter.

use crate::error::{PaymentError, Result};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a single invocation of a retried operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T, E> {
    Success(T),
    RetryableFailure(E),
    FatalFailure(E),
}

/// Decides from a failure's description whether it may be retried.
pub type Classifier = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    max_elapsed: Option<Duration>,
    classifier: Classifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("max_elapsed", &self.max_elapsed)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.2,
            max_elapsed: Some(Duration::from_secs(30)),
            classifier: Arc::new(|_| true),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter: f64,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(PaymentError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&jitter) {
            return Err(PaymentError::ConfigError(format!(
                "jitter must be within [0, 1], got {jitter}"
            )));
        }
        if base_delay > max_delay {
            return Err(PaymentError::ConfigError(format!(
                "base delay {base_delay:?} exceeds max delay {max_delay:?}"
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter,
            max_elapsed: None,
            classifier: Arc::new(|_| true),
        })
    }

    /// A single try, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
            max_elapsed: None,
            classifier: Arc::new(|_| false),
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed
    }

    pub fn is_retryable(&self, reason: &str) -> bool {
        (self.classifier)(reason)
    }

    /// Delay after the `attempt`-th failure before jitter:
    /// `min(max_delay, base_delay * 2^(attempt - 1))`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Nominal delay scaled by a random factor in `[1 - jitter, 1 + jitter]`,
    /// capped at `max_delay`.
    pub fn jittered_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter == 0.0 || nominal.is_zero() {
            return nominal;
        }
        let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
        nominal.mul_f64(factor.max(0.0)).min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The operation reported a non-retryable failure.
    Fatal(E),
    /// `max_attempts` were spent, or the next delay would overrun `max_elapsed`.
    Exhausted(E),
    /// The abort signal fired during a backoff delay. Holds the last failure.
    Aborted(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) | RetryError::Exhausted(e) | RetryError::Aborted(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Fatal(e) => write!(f, "{e}"),
            RetryError::Exhausted(e) => write!(f, "retries exhausted: {e}"),
            RetryError::Aborted(e) => write!(f, "retry aborted: {e}"),
        }
    }
}

/// The result of a retried operation and the number of invocations it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: std::result::Result<T, RetryError<E>>,
    pub attempts: u32,
}

/// Drives an operation under a [`RetryPolicy`].
///
/// Holds no state between calls; one controller can run any number of
/// operations concurrently. Backoff suspends only the calling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryController;

impl RetryController {
    pub fn new() -> Self {
        Self
    }

    /// Runs `operation` until it succeeds, fails fatally, or the policy's
    /// bounds are reached. The closure receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, policy: &RetryPolicy, operation: F) -> Retried<T, E>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        self.execute_until(policy, std::future::pending(), operation)
            .await
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`RetryError::Aborted`] as soon as `abort` completes while waiting
    /// between attempts. An attempt already running is never interrupted.
    pub async fn execute_until<T, E, F, Fut, A>(
        &self,
        policy: &RetryPolicy,
        abort: A,
        mut operation: F,
    ) -> Retried<T, E>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
        A: Future<Output = ()>,
    {
        let mut abort = pin!(abort);
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            let outcome = operation(attempts + 1).await;
            attempts += 1;

            let error = match outcome {
                Attempt::Success(value) => {
                    return Retried {
                        result: Ok(value),
                        attempts,
                    };
                }
                Attempt::FatalFailure(error) => {
                    return Retried {
                        result: Err(RetryError::Fatal(error)),
                        attempts,
                    };
                }
                Attempt::RetryableFailure(error) => error,
            };

            let reason = error.to_string();
            if !policy.is_retryable(&reason) {
                debug!(attempt = attempts, %reason, "Failure classified as fatal");
                return Retried {
                    result: Err(RetryError::Fatal(error)),
                    attempts,
                };
            }
            if attempts >= policy.max_attempts {
                warn!(attempts, %reason, "Retries exhausted");
                return Retried {
                    result: Err(RetryError::Exhausted(error)),
                    attempts,
                };
            }

            let delay = next_delay(policy, attempts);
            if let Some(max_elapsed) = policy.max_elapsed
                && started.elapsed() + delay > max_elapsed
            {
                warn!(attempts, %reason, ?max_elapsed, "Retry time budget spent");
                return Retried {
                    result: Err(RetryError::Exhausted(error)),
                    attempts,
                };
            }

            warn!(attempt = attempts, %reason, ?delay, "Retryable failure, backing off");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut abort => {
                    debug!(attempts, "Backoff aborted");
                    return Retried {
                        result: Err(RetryError::Aborted(error)),
                        attempts,
                    };
                }
            }
        }
    }
}

fn next_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.jittered_delay(attempt, &mut rand::thread_rng())
}
