use chrono::{TimeZone, Utc};
use reqwest::{header::HeaderMap, StatusCode};
use std::str::FromStr;

/// Rate limit state reported by Discord on every REST response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Epoch time, in seconds, at which the bucket resets.
    pub reset: Option<f64>,
    pub reset_after: Option<f64>,
    pub bucket: Option<String>,
    /// Only present on 429 responses.
    pub retry_after: Option<f64>,
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: Self::get_header(headers, "x-ratelimit-limit"),
            remaining: Self::get_header(headers, "x-ratelimit-remaining"),
            reset: Self::get_header(headers, "x-ratelimit-reset"),
            reset_after: Self::get_header(headers, "x-ratelimit-reset-after"),
            bucket: Self::get_header(headers, "x-ratelimit-bucket"),
            retry_after: Self::get_header(headers, "retry-after"),
        }
    }

    pub fn log(&self, endpoint: &str, status: StatusCode) {
        tracing::debug!(
            "Discord API response: {} (status: {}, remaining: {:?}/{:?}, bucket: {:?})",
            endpoint,
            status.as_u16(),
            self.remaining,
            self.limit,
            self.bucket
        );
        if let Some(reset) = self.reset {
            if let Some(reset_at) = Utc.timestamp_millis_opt((reset * 1000.0) as i64).single() {
                tracing::debug!(
                    "Rate limit for {} resets at {} (in {:?}s)",
                    endpoint,
                    reset_at.to_rfc3339(),
                    self.reset_after
                );
            }
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(
                "Rate limited on {}. Retry after: {:?} seconds",
                endpoint,
                self.retry_after
            );
        }
    }

    fn get_header<T: FromStr>(headers: &HeaderMap, header: &str) -> Option<T> {
        headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<T>().ok())
    }
}
