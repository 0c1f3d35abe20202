//! Bounded, cancellable reconnect loop.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a reconnect loop gave up.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RetryError {
    /// Every probe in the budget failed.
    #[error("gave up after {attempts} probes")]
    Exhausted { attempts: usize },

    /// The cancellation token fired while waiting between probes.
    #[error("reconnect cancelled")]
    Cancelled,
}

/// Fixed-interval probe budget.
///
/// `max_retries` counts probes in total, so a budget of 5 means at most five
/// calls to the probe with four waits in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: usize,
    pub interval: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_retries: usize, interval: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            interval,
        }
    }

    /// Probe until one succeeds, the budget runs out, or `cancel` fires.
    ///
    /// The first probe always runs; cancellation only cuts the waits between
    /// probes short.
    ///
    /// The probe receives the zero-based attempt number. On success the number
    /// of probes used is returned.
    pub async fn run<F, Fut, E>(&self, cancel: &CancellationToken, mut probe: F) -> Result<usize, RetryError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match probe(attempt).await {
                Ok(()) => {
                    debug!(attempt, "Probe succeeded");
                    return Ok(attempt + 1);
                }
                Err(e) => {
                    attempt += 1;
                    warn!(attempt, max_retries = self.max_retries, error = %e, "Probe failed");
                    if attempt >= self.max_retries {
                        return Err(RetryError::Exhausted { attempts: attempt });
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}
