
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::SearchError;
use crate::embeddings::ProviderError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Bounded retry with capped exponential backoff.
///
/// The wait before retry `n` (counting from zero) is `min(max_wait, 2^n seconds)`.
/// Whether a failure is worth retrying is decided per call site, so the same
/// policy can wrap any fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_wait: Duration,
}

#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    #[error("{0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The failure that ended the last attempt.
    #[inline]
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::Permanent(source) => source,
        }
    }
}

impl From<RetryError<ProviderError>> for SearchError {
    #[inline]
    fn from(error: RetryError<ProviderError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, source } => {
                Self::ExhaustedRetries { attempts, source }
            }
            RetryError::Permanent(source) => Self::Provider(source),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_WAIT)
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    #[inline]
    pub fn new(max_attempts: u32, max_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_wait,
        }
    }

    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[inline]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Wait applied before retry number `retry` (0 for the first retry).
    #[inline]
    pub fn backoff(&self, retry: u32) -> Duration {
        2u64.checked_pow(retry)
            .map_or(Duration::MAX, Duration::from_secs)
            .min(self.max_wait)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Sleeps on the calling thread between attempts.
    #[inline]
    pub fn run<T, E, F, R>(&self, is_retryable: R, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        self.run_with_sleep(is_retryable, op, std::thread::sleep)
    }

    /// Same as [`RetryPolicy::run`] with the sleep function supplied by the caller.
    pub fn run_with_sleep<T, E, F, R, S>(
        &self,
        is_retryable: R,
        mut op: F,
        mut sleep: S,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        S: FnMut(Duration),
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Attempt {}/{}", attempt, self.max_attempts);

            let error = match op() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !is_retryable(&error) {
                debug!("Non-retryable failure, giving up: {}", error);
                return Err(RetryError::Permanent(error));
            }

            if attempt >= self.max_attempts {
                warn!("Retry budget of {} attempts spent: {}", attempt, error);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            let wait = self.backoff(attempt - 1);
            warn!(
                "Retryable failure on attempt {}/{}: {}; waiting {:?}",
                attempt, self.max_attempts, error, wait
            );
            sleep(wait);
        }
    }
}
