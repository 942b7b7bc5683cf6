//! Backoff for retrieval, the only idempotent call.

use std::time::Duration;

use reqwest::StatusCode;

/// Retries after the first retrieval attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Lowercased fragments of provider messages that signal a transient condition.
const TRANSIENT_MESSAGES: [&str; 5] = [
    "rate limit",
    "ratelimit",
    "overloaded",
    "too many requests",
    "service unavailable",
];

/// Whether a non-2xx retrieval answer is worth another attempt.
pub fn is_retryable_status(status: StatusCode, body: &str) -> bool {
    if matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    ) {
        return true;
    }

    let body = body.to_ascii_lowercase();
    TRANSIENT_MESSAGES
        .iter()
        .any(|fragment| body.contains(fragment))
}

/// Delay before retry number `attempt` (zero-based): 1s, 2s, 4s, ... capped.
pub fn backoff_delay(attempt: u32) -> Duration {
    BASE_RETRY_DELAY
        .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        .min(MAX_RETRY_DELAY)
}
