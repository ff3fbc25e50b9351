//! Single retry after HTTP 429 responses.
//!
//! Both tracker interceptors send authenticated requests through
//! [`RateLimitRetry`]: on a 429 the response is dropped, the client waits for
//! the server-advertised `Retry-After` (bounded), and the same request is sent
//! exactly once more. The second response is returned as-is, even if it is
//! another 429.
//!
//! The wait is a `tokio::time::sleep`, so dropping the request future cancels
//! it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use reqwest::header::RETRY_AFTER;
use tracing::{debug, info, instrument, warn};

use super::{HttpChain, TrackerRequest, TrackerResponse, TransportError};

/// HTTP status for Too Many Requests.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Wait used when `Retry-After` is missing or unusable.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// Upper bound for a single rate-limit wait.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Concurrent backoffs above this count are logged as a warning.
pub const BACKOFF_WARNING_THRESHOLD: usize = 16;

/// Parses a `Retry-After` header into the wait before the single resend.
///
/// Accepts integer seconds and HTTP-dates. A missing, unparseable or
/// negative value yields [`DEFAULT_RATE_LIMIT_WAIT`]; a date in the past
/// yields zero; everything is capped at [`MAX_RATE_LIMIT_WAIT`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use aniqueue_core::tracker::parse_retry_after;
///
/// assert_eq!(parse_retry_after(Some("3")), Duration::from_secs(3));
/// assert_eq!(parse_retry_after(None), Duration::from_secs(5));
/// assert_eq!(parse_retry_after(Some("9999")), Duration::from_secs(60));
/// ```
#[must_use]
#[instrument(level = "debug")]
pub fn parse_retry_after(header_value: Option<&str>) -> Duration {
    let Some(header_value) = header_value.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_RATE_LIMIT_WAIT;
    };

    let requested = if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, using default");
            return DEFAULT_RATE_LIMIT_WAIT;
        }
        Duration::from_secs(seconds.unsigned_abs())
    } else if let Ok(date) = httpdate::parse_http_date(header_value) {
        date.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    } else {
        debug!(header_value, "unparseable Retry-After value, using default");
        return DEFAULT_RATE_LIMIT_WAIT;
    };

    if requested > MAX_RATE_LIMIT_WAIT {
        warn!(
            requested_secs = requested.as_secs(),
            max_secs = MAX_RATE_LIMIT_WAIT.as_secs(),
            "Retry-After exceeds maximum, capping"
        );
        return MAX_RATE_LIMIT_WAIT;
    }
    requested
}

/// 429 handling shared by an interceptor's requests.
#[derive(Debug, Default)]
pub struct RateLimitRetry {
    in_backoff: AtomicUsize,
}

/// Decrements the backoff gauge when the wait ends or is cancelled.
struct BackoffGuard<'a>(&'a AtomicUsize);

impl Drop for BackoffGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RateLimitRetry {
    /// Creates an idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently waiting out a 429.
    #[must_use]
    pub fn backoffs_in_flight(&self) -> usize {
        self.in_backoff.load(Ordering::Relaxed)
    }

    /// Sends `request`, retrying once after a 429.
    ///
    /// # Errors
    ///
    /// Returns the transport error of whichever send failed.
    #[instrument(skip_all, fields(url = %request.url))]
    pub async fn proceed(
        &self,
        chain: &dyn HttpChain,
        request: TrackerRequest,
    ) -> Result<TrackerResponse, TransportError> {
        let response = chain.proceed(request.clone()).await?;
        if response.status != TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let wait = parse_retry_after(response.header(RETRY_AFTER.as_str()));
        drop(response);

        {
            let in_flight = self.in_backoff.fetch_add(1, Ordering::Relaxed) + 1;
            let _guard = BackoffGuard(&self.in_backoff);
            if in_flight > BACKOFF_WARNING_THRESHOLD {
                warn!(in_flight, "Many requests are waiting out tracker rate limits");
            }
            info!(wait_ms = wait.as_millis(), "Rate limited (429), waiting before single retry");
            tokio::time::sleep(wait).await;
        }

        chain.proceed(request).await
    }
}
