//! Retrying fetch of a single Slack API request.
//!
//! Transport failures are retried with linear backoff. A body with
//! `ok: false` is returned to the caller at once as [`AppError::Api`]: those
//! are permission or auth problems (`not_in_channel`, `invalid_auth`) that
//! the same request will not get past on a second try.

use std::time::Duration;

use serde_json::Value;

use crate::domain::{AppConfig, AppError, CancellationToken, Result};
use crate::infrastructure::{ApiMethod, Params, Transport};

use super::pacing::Pacer;

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub attempts: u32,
    /// Delay after attempt `n` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn from_config(config: &AppConfig) -> Self {
        Self {
            attempts: config.api.retries,
            base_delay: config.backoff(),
        }
    }

    /// Delay to wait after the given 1-based failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Issues Slack API requests with retry, backoff and cancellation checks.
pub struct Fetcher<T, P> {
    transport: T,
    pacer: P,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<T: Transport, P: Pacer> Fetcher<T, P> {
    #[must_use]
    pub const fn new(transport: T, pacer: P, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            transport,
            pacer,
            policy,
            cancel,
        }
    }

    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub const fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Fetches one JSON response.
    ///
    /// # Errors
    /// - [`AppError::Cancelled`] if a stop was requested before an attempt
    /// - [`AppError::Api`] immediately when the body says `ok: false`
    /// - the last transport error once all attempts are used up
    pub fn fetch(&self, method: ApiMethod, params: &Params) -> Result<Value> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            match self
                .transport
                .call(method, params)
                .and_then(|body| check_ok(method, body))
            {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        %method,
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Request failed, retrying"
                    );
                    self.pacer.pause(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Turns an `ok: false` body into an API error. A missing flag counts as ok.
fn check_ok(method: ApiMethod, body: Value) -> Result<Value> {
    if body.get("ok").and_then(Value::as_bool) == Some(false) {
        let code = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        return Err(AppError::Api {
            method: method.as_str().to_string(),
            code,
        });
    }
    Ok(body)
}
