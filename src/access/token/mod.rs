//! Result-access token records and their storage.
//!
//! One record per student public identifier. Records are created lazily on the
//! first verification, never deleted automatically, and superseded only by an
//! explicit re-issue which resets the attempt counter.

mod memory;
mod postgres;
mod verifier;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

pub use memory::MemoryTokenStore;
pub use postgres::PgTokenStore;
pub use verifier::{IssuedToken, TokenVerifier, Verified};

#[derive(Clone, Debug)]
pub struct TokenRecord {
    pub student_public_id: String,
    pub token_value: SecretString,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

impl TokenRecord {
    /// New record valid from `now` for `ttl`, with no attempts used.
    ///
    /// # Errors
    /// Returns an error if `now + ttl` is not a representable instant.
    pub fn issue(
        student_public_id: &str,
        token_value: SecretString,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self> {
        let expires_at = now
            .checked_add_signed(ttl)
            .context("token expiry out of range")?;
        Ok(Self {
            student_public_id: student_public_id.to_string(),
            token_value,
            created_at: now,
            expires_at,
            attempts: 0,
        })
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// State of a record after one verification attempt was registered.
#[derive(Clone, Debug)]
pub struct AttemptSnapshot {
    pub record: TokenRecord,
    /// The record was inserted by this call.
    pub created: bool,
    /// The record had expired; `attempts` was left untouched.
    pub expired: bool,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, student_public_id: &str) -> Result<Option<TokenRecord>>;

    /// Atomically per student: insert `fresh` when no record exists, then either
    /// report expiry without counting or increment `attempts` by one.
    async fn register_attempt(
        &self,
        student_public_id: &str,
        now: DateTime<Utc>,
        fresh: TokenRecord,
    ) -> Result<AttemptSnapshot>;

    /// Supersede whatever record exists for `record.student_public_id`.
    async fn replace(&self, record: TokenRecord) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
