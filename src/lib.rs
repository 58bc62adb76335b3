//! # Edugate (School Portal Access Control)
//!
//! `edugate` gates every page of the school portal and lets parents or students
//! without a full account read exam results by presenting a short-lived,
//! attempt-limited result token.
//!
//! ## Route Authorization
//!
//! Roles are a closed set (`admin`, `teacher`, `student`, `anonymous`). Each role
//! owns a set of allowed path prefixes and a default landing route. The guard is
//! a pure function of `(role, path, profile state)`:
//!
//! - **Loading:** while identity or profile resolution is in flight nothing is
//!   rendered and no redirect is issued.
//! - **Unauthorized:** no identity on a non-public path redirects to `/login`
//!   carrying the original path as the return target.
//! - **Redirect loops:** an authenticated user on `/login` is sent to the role's
//!   landing route with a history *replace*, never a push.
//!
//! Every uncertain outcome resolves to a redirect. The guard fails closed.
//!
//! ## Result Tokens
//!
//! A token record is keyed by the student's public identifier and holds the
//! secret, its expiry and an attempt counter.
//!
//! - **Expiry first:** an expired record is rejected without touching the counter.
//! - **Every attempt counts:** each verification against a live record consumes
//!   an attempt, including a successful one. The sixth call is the first one
//!   rejected for exhaustion.
//! - **Per-key serialization:** attempts against the same student are applied one
//!   at a time; different students proceed in parallel.
//!
//! Token *requests* are a separate queue an operator works through to deliver
//! a fresh secret out of band. A request never grants access by itself.

pub mod access;
pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
