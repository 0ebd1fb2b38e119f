/*
    spotify-export-rs | Rust CLI tool to export playlists and Liked Songs to CSV.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Retry handling for remote calls.
//!
//! Every call to the service goes through [`RequestExecutor`], which applies
//! one policy to every failure:
//!
//! - `429` waits for the server's `Retry-After` hint and tries again, forever.
//!   Rate limiting never counts against the retry budget.
//! - statuses the caller asked to swallow become an empty result.
//! - `500`/`502`/`503`/`504` and status-less failures are retried with
//!   exponential backoff until the budget runs out.
//! - everything else is handed back unchanged.

use crate::api::ApiError;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const RATE_LIMITED: u16 = 429;
pub const TRANSIENT_STATUSES: [u16; 4] = [500, 502, 503, 504];
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Exponential backoff: `min(cap, base * 2^attempt)` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: f64,
    pub cap: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: 0.5, cap: 8.0 }
    }
}

impl Backoff {
    pub fn new(base: f64, cap: f64) -> Self {
        Self { base, cap }
    }

    /// Delay in seconds before retry number `attempt`.
    pub fn compute_delay(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        (self.base * 2f64.powi(exponent)).min(self.cap)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::try_from_secs_f64(self.compute_delay(attempt).max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Parses a `Retry-After` header value given in seconds.
///
/// Missing, unparsable, negative or non-finite values fall back to one second.
pub fn retry_after_delay(value: Option<&str>) -> Duration {
    value
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// What to do about one failed attempt.
#[derive(Debug, PartialEq)]
enum Verdict {
    RateLimited(Duration),
    Swallow,
    Retry,
    Fatal,
}

fn classify(err: &ApiError, swallow: &[u16], attempt: u32, max_retries: u32) -> Verdict {
    let budget_left = attempt < max_retries;
    match err {
        ApiError::Status { status, .. } if *status == RATE_LIMITED => {
            Verdict::RateLimited(retry_after_delay(err.retry_after()))
        }
        ApiError::Status { status, .. } if swallow.contains(status) => Verdict::Swallow,
        ApiError::Status { status, .. } if TRANSIENT_STATUSES.contains(status) && budget_left => {
            Verdict::Retry
        }
        ApiError::Transport(_) if budget_left => Verdict::Retry,
        _ => Verdict::Fatal,
    }
}

/// Why a call ended without a value.
enum Halt {
    Swallowed(ApiError),
    Fatal(ApiError),
}

/// Wraps single remote calls with the retry/swallow/propagate policy.
///
/// Calls are independent: the attempt counter lives for one `execute` only.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    max_retries: u32,
    backoff: Backoff,
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, Backoff::default())
    }
}

impl RequestExecutor {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs `action` until it succeeds or fails for good.
    pub async fn execute<T, F, Fut>(&self, action: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match self.run(action, &[]).await {
            Ok(value) => Ok(value),
            Err(Halt::Swallowed(err)) | Err(Halt::Fatal(err)) => Err(err),
        }
    }

    /// Like [`execute`](Self::execute), but a failure whose status is in
    /// `swallow` yields `Ok(None)` straight away, without retrying.
    pub async fn execute_or_swallow<T, F, Fut>(
        &self,
        action: F,
        swallow: &[u16],
    ) -> Result<Option<T>, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match self.run(action, swallow).await {
            Ok(value) => Ok(Some(value)),
            Err(Halt::Swallowed(_)) => Ok(None),
            Err(Halt::Fatal(err)) => Err(err),
        }
    }

    async fn run<T, F, Fut>(&self, mut action: F, swallow: &[u16]) -> Result<T, Halt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;

        loop {
            let err = match action().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Request succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match classify(&err, swallow, attempt, self.max_retries) {
                Verdict::RateLimited(wait) => {
                    warn!("Rate limited, waiting {:.1}s before retrying", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
                Verdict::Swallow => {
                    debug!("Treating '{}' as an empty result", err);
                    return Err(Halt::Swallowed(err));
                }
                Verdict::Retry => {
                    attempt += 1;
                    let wait = self.backoff.delay(attempt);
                    warn!(
                        "Request failed ({}), retry {}/{} in {:.1}s",
                        err,
                        attempt,
                        self.max_retries,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
                Verdict::Fatal => return Err(Halt::Fatal(err)),
            }
        }
    }
}
