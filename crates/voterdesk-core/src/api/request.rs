//! Per-call request data: identity of one attempt, caller options and the
//! retry schedule.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use uuid::Uuid;

use super::ApiError;
use crate::config::RetryPolicy;

/// Identifies one attempt of a logical request. Each retry gets a fresh
/// id and timestamp; `retry_count` carries over.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl RequestContext {
    pub fn new(retry_count: u32) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            issued_at: Utc::now(),
            retry_count,
        }
    }

    /// ISO-8601 with milliseconds, e.g. `2024-05-01T10:00:00.123Z`.
    pub fn issued_at_header(&self) -> String {
        self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Optional extras for a pipeline call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) idempotency_key: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra header. Cannot replace the security headers; can replace
    /// `Content-Type`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sent as `Idempotency-Key`; lets POST and PATCH be retried.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Idempotency key generated on the spot.
    pub fn idempotent(self) -> Self {
        self.idempotency_key(Uuid::new_v4().to_string())
    }

    pub(crate) fn extra_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::Validation(format!("Invalid header name: {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::Validation(format!("Invalid value for header {}", name)))?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

/// Wait before retry number `retry_count + 1`: `base * (retry_count + 1)`.
pub fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
    base * (retry_count + 1)
}

/// Whether a 5xx on `method` may be retried under `policy`.
pub(crate) fn may_retry(policy: RetryPolicy, method: &Method, options: &RequestOptions) -> bool {
    match policy {
        RetryPolicy::AllMethods => true,
        RetryPolicy::Idempotent => {
            matches!(*method, Method::GET | Method::PUT | Method::DELETE)
                || options.idempotency_key.is_some()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let base = Duration::from_millis(1000);
        let delays: Vec<u128> = (0..3).map(|n| backoff_delay(base, n).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = RequestContext::new(0);
        let b = RequestContext::new(1);
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(b.retry_count, 1);
    }

    #[test]
    fn test_issued_at_format() {
        let ctx = RequestContext::new(0);
        let header = ctx.issued_at_header();
        assert!(header.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&header).is_ok());
    }

    #[test]
    fn test_retry_policy() {
        let plain = RequestOptions::new();
        let keyed = RequestOptions::new().idempotent();

        assert!(may_retry(RetryPolicy::Idempotent, &Method::GET, &plain));
        assert!(may_retry(RetryPolicy::Idempotent, &Method::DELETE, &plain));
        assert!(!may_retry(RetryPolicy::Idempotent, &Method::POST, &plain));
        assert!(!may_retry(RetryPolicy::Idempotent, &Method::PATCH, &plain));
        assert!(may_retry(RetryPolicy::Idempotent, &Method::POST, &keyed));
        assert!(may_retry(RetryPolicy::AllMethods, &Method::PATCH, &plain));
    }

    #[test]
    fn test_invalid_header_is_validation_error() {
        let options = RequestOptions::new().header("bad header", "x");
        assert!(matches!(options.extra_headers(), Err(ApiError::Validation(_))));

        let options = RequestOptions::new().header("X-Trace", "line\nbreak");
        assert!(matches!(options.extra_headers(), Err(ApiError::Validation(_))));
    }
}
