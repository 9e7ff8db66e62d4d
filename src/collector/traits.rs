//! Core collector traits and types.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Minimum allowed interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Request headers, ordered for stable logging.
pub type Headers = BTreeMap<String, String>;

/// Outbound HTTP failure.
///
/// Timeouts, refused connections and non-2xx answers all land here; callers
/// log the detail and treat every variant the same way.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No complete response within the deadline.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// Connection, TLS or protocol failure.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// Server answered with a non-2xx status.
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Errors that abort a collection cycle before any sink runs.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Provider could not be reached or refused the request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Provider body is not the expected JSON document.
    #[error("invalid provider payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Fixed interval between collection cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
}

impl Schedule {
    /// Create an interval schedule.
    ///
    /// Interval is clamped to a minimum of 1 second.
    pub fn interval(duration: Duration) -> Self {
        if duration < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            Self {
                interval: MIN_INTERVAL,
            }
        } else {
            Self { interval: duration }
        }
    }

    /// Sleep between the end of one cycle and the start of the next.
    pub fn period(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "every {}", humantime::format_duration(self.interval))
    }
}

/// Timed HTTP client used by the collector and the forwarding sink.
///
/// Implementations never retry; the collector's interval is the retry policy.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// GET `url` and return the raw body of a 2xx response.
    async fn get(
        &self,
        url: &str,
        headers: &Headers,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// POST `body` to `url` and return the status of a 2xx response.
    ///
    /// With `verify_tls` off the server certificate is not validated.
    async fn post(
        &self,
        url: &str,
        headers: &Headers,
        body: Vec<u8>,
        timeout: Duration,
        verify_tls: bool,
    ) -> Result<u16, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_interval_minimum() {
        let schedule = Schedule::interval(Duration::from_millis(100));
        assert_eq!(schedule.period(), MIN_INTERVAL);
    }

    #[test]
    fn test_schedule_interval_valid() {
        let schedule = Schedule::interval(Duration::from_secs(30));
        assert_eq!(schedule.period(), Duration::from_secs(30));
        assert_eq!(schedule.to_string(), "every 30s");
    }

    #[test]
    fn test_transport_error_carries_url() {
        let err = TransportError::Status {
            url: "http://localhost/data".to_string(),
            status: 503,
        };
        let msg = err.to_string();
        assert!(msg.contains("http://localhost/data"));
        assert!(msg.contains("503"));

        let err: CollectorError = err.into();
        assert!(err.to_string().starts_with("transport error"));
    }
}
