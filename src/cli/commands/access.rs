//! Result token, request queue and guard settings.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::access::config::{MAX_DURATION_SECONDS, MAX_PROFILE_TIMEOUT_MS};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_TOKEN_TTL_SECONDS: &str = "result-token-ttl-seconds";
pub const ARG_TOKEN_MAX_ATTEMPTS: &str = "result-token-max-attempts";
pub const ARG_TOKEN_SECRET: &str = "result-token-secret";
pub const ARG_REQUEST_TTL_SECONDS: &str = "token-request-ttl-seconds";
pub const ARG_REQUEST_DELIVERY_SECONDS: &str = "token-request-delivery-seconds";
pub const ARG_PROFILE_TIMEOUT_MS: &str = "profile-timeout-ms";

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub token_ttl_seconds: i64,
    pub token_max_attempts: u32,
    pub token_secret: Option<SecretString>,
    pub request_ttl_seconds: i64,
    pub request_delivery_seconds: i64,
    pub profile_timeout_ms: u64,
}

impl Options {
    /// Read the access settings out of parsed matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is somehow missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            token_ttl_seconds: required(matches, ARG_TOKEN_TTL_SECONDS)?,
            token_max_attempts: required(matches, ARG_TOKEN_MAX_ATTEMPTS)?,
            token_secret: matches
                .get_one::<String>(ARG_TOKEN_SECRET)
                .filter(|secret| !secret.trim().is_empty())
                .map(|secret| SecretString::from(secret.trim().to_string())),
            request_ttl_seconds: required(matches, ARG_REQUEST_TTL_SECONDS)?,
            request_delivery_seconds: required(matches, ARG_REQUEST_DELIVERY_SECONDS)?,
            profile_timeout_ms: required(matches, ARG_PROFILE_TIMEOUT_MS)?,
        })
    }
}

fn required<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_request_args(command);
    with_guard_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Lifetime of a result token in seconds")
                .env("EDUGATE_RESULT_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_TOKEN_MAX_ATTEMPTS)
                .long(ARG_TOKEN_MAX_ATTEMPTS)
                .help("Verification attempts allowed per token")
                .env("EDUGATE_RESULT_TOKEN_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Shared token value for every new record")
                .long_help(
                    "Shared token value for every new record. When unset each record gets a random 32-byte secret delivered out of band.",
                )
                .env("EDUGATE_RESULT_TOKEN_SECRET")
                .hide_env_values(true),
        )
}

fn with_request_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REQUEST_TTL_SECONDS)
                .long(ARG_REQUEST_TTL_SECONDS)
                .help("Lifetime of a pending token request in seconds")
                .env("EDUGATE_TOKEN_REQUEST_TTL_SECONDS")
                .default_value("172800")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_REQUEST_DELIVERY_SECONDS)
                .long(ARG_REQUEST_DELIVERY_SECONDS)
                .help("Delivery estimate reported for new token requests")
                .env("EDUGATE_TOKEN_REQUEST_DELIVERY_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(0..=MAX_DURATION_SECONDS)),
        )
}

fn with_guard_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Portal frontend base URL, used as the CORS origin")
                .env("EDUGATE_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_PROFILE_TIMEOUT_MS)
                .long(ARG_PROFILE_TIMEOUT_MS)
                .help("How long the guard waits for a profile before redirecting to login")
                .env("EDUGATE_PROFILE_TIMEOUT_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_PROFILE_TIMEOUT_MS)),
        )
}
