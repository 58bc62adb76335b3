//! Runtime configuration for token verification, the request queue and the guard.

use chrono::TimeDelta as ChronoDuration;
use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_REQUEST_TTL_SECONDS: i64 = 48 * 60 * 60;
const DEFAULT_DELIVERY_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_PROFILE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_RECENT_REQUESTS: usize = 5;

/// Upper bound for any lifetime or delay setting: ten years.
pub const MAX_DURATION_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;
pub const MAX_PROFILE_TIMEOUT_MS: u64 = 60_000;

#[derive(Clone, Debug)]
pub struct AccessConfig {
    frontend_base_url: String,
    token_ttl_seconds: i64,
    max_attempts: u32,
    shared_secret: Option<SecretString>,
    request_ttl_seconds: i64,
    delivery_seconds: i64,
    profile_timeout_ms: u64,
    recent_requests: usize,
}

impl AccessConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            shared_secret: None,
            request_ttl_seconds: DEFAULT_REQUEST_TTL_SECONDS,
            delivery_seconds: DEFAULT_DELIVERY_SECONDS,
            profile_timeout_ms: DEFAULT_PROFILE_TIMEOUT_MS,
            recent_requests: DEFAULT_RECENT_REQUESTS,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Every new record gets this secret instead of a random one.
    #[must_use]
    pub fn with_shared_secret(mut self, secret: Option<SecretString>) -> Self {
        self.shared_secret = secret;
        self
    }

    #[must_use]
    pub fn with_request_ttl_seconds(mut self, seconds: i64) -> Self {
        self.request_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_delivery_seconds(mut self, seconds: i64) -> Self {
        self.delivery_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_profile_timeout_ms(mut self, millis: u64) -> Self {
        self.profile_timeout_ms = millis;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn token_ttl(&self) -> ChronoDuration {
        seconds_or_max(self.token_ttl_seconds)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn shared_secret(&self) -> Option<&SecretString> {
        self.shared_secret.as_ref()
    }

    #[must_use]
    pub fn request_ttl(&self) -> ChronoDuration {
        seconds_or_max(self.request_ttl_seconds)
    }

    #[must_use]
    pub fn delivery_estimate(&self) -> ChronoDuration {
        seconds_or_max(self.delivery_seconds)
    }

    #[must_use]
    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }

    #[must_use]
    pub fn recent_requests(&self) -> usize {
        self.recent_requests
    }
}

/// Out-of-range values saturate; callers add them with checked arithmetic.
fn seconds_or_max(seconds: i64) -> ChronoDuration {
    ChronoDuration::try_seconds(seconds).unwrap_or(ChronoDuration::MAX)
}
