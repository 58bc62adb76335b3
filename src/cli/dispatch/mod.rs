//! Map parsed CLI arguments onto an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, access};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty());

    let access_opts = access::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: access_opts.frontend_base_url,
        token_ttl_seconds: access_opts.token_ttl_seconds,
        token_max_attempts: access_opts.token_max_attempts,
        token_secret: access_opts.token_secret,
        request_ttl_seconds: access_opts.request_ttl_seconds,
        request_delivery_seconds: access_opts.request_delivery_seconds,
        profile_timeout_ms: access_opts.profile_timeout_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        temp_env::with_vars(
            [
                ("EDUGATE_DSN", None::<&str>),
                ("EDUGATE_PORT", None::<&str>),
                ("EDUGATE_RESULT_TOKEN_MAX_ATTEMPTS", Some("3")),
            ],
            || -> Result<()> {
                let matches = crate::cli::commands::new()
                    .try_get_matches_from(vec!["edugate", "--port", "8181"])?;
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 8181);
                assert!(args.dsn.is_none());
                assert_eq!(args.token_max_attempts, 3);
                Ok(())
            },
        )
    }

    #[test]
    fn blank_dsn_means_in_memory() -> Result<()> {
        temp_env::with_vars([("EDUGATE_DSN", Some("  "))], || -> Result<()> {
            let matches = crate::cli::commands::new().try_get_matches_from(vec!["edugate"])?;
            let Action::Server(args) = handler(&matches)?;
            assert!(args.dsn.is_none());
            Ok(())
        })
    }
}
