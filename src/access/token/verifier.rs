//! Result token verification and re-issue.
//!
//! Order of checks for one call:
//! 1) create the record if the student has none,
//! 2) reject an expired record without counting the attempt,
//! 3) count the attempt, whatever the submitted value,
//! 4) reject once the counter passes the maximum,
//! 5) compare the submitted value.
//!
//! A correct token still consumes an attempt slot.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{TokenRecord, TokenStore};
use crate::access::{
    config::AccessConfig,
    error::AccessError,
    utils::{generate_token_secret, secrets_match, valid_public_id},
};

/// Successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verified {
    pub attempts: u32,
    pub expires_at: DateTime<Utc>,
}

/// Fresh secret produced by a re-issue, for out-of-band delivery.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub student_public_id: String,
    pub secret: SecretString,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenVerifier {
    store: Arc<dyn TokenStore>,
    config: AccessConfig,
}

impl TokenVerifier {
    pub fn new(store: Arc<dyn TokenStore>, config: AccessConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Storage health for `/health`.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.store.ping().await
    }

    /// Verify `submitted` for `student_public_id` at the current time.
    ///
    /// # Errors
    /// `InvalidInput`, `Expired`, `AttemptsExhausted`, `InvalidToken`, or `StorageFailure`.
    pub async fn verify(
        &self,
        student_public_id: &str,
        submitted: &str,
    ) -> Result<Verified, AccessError> {
        self.verify_at(student_public_id, submitted, Utc::now())
            .await
    }

    /// Verify at an explicit instant.
    ///
    /// # Errors
    /// See [`TokenVerifier::verify`].
    pub async fn verify_at(
        &self,
        student_public_id: &str,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<Verified, AccessError> {
        let student_public_id = student_public_id.trim();
        if !valid_public_id(student_public_id) {
            return Err(AccessError::InvalidInput("studentId".to_string()));
        }
        if submitted.is_empty() {
            return Err(AccessError::InvalidInput("token".to_string()));
        }

        let fresh = self.new_record(student_public_id, now)?;
        let snapshot = self
            .store
            .register_attempt(student_public_id, now, fresh)
            .await
            .map_err(|err| {
                error!(student_id = student_public_id, "Failed to register token attempt: {err:#}");
                AccessError::storage(&err)
            })?;

        if snapshot.created {
            info!(student_id = student_public_id, "Created result token record");
        }

        let record = snapshot.record;
        if snapshot.expired {
            info!(
                student_id = student_public_id,
                attempts = record.attempts,
                outcome = "expired",
                "Result token rejected"
            );
            return Err(AccessError::Expired);
        }

        if record.attempts > self.config.max_attempts() {
            warn!(
                student_id = student_public_id,
                attempts = record.attempts,
                outcome = "exhausted",
                "Result token rejected"
            );
            return Err(AccessError::AttemptsExhausted);
        }

        if !secrets_match(submitted, record.token_value.expose_secret()) {
            info!(
                student_id = student_public_id,
                attempts = record.attempts,
                outcome = "invalid",
                "Result token rejected"
            );
            return Err(AccessError::InvalidToken);
        }

        info!(
            student_id = student_public_id,
            attempts = record.attempts,
            outcome = "allowed",
            "Result token accepted"
        );
        Ok(Verified {
            attempts: record.attempts,
            expires_at: record.expires_at,
        })
    }

    /// Supersede the student's record with a fresh secret and a zeroed counter.
    ///
    /// # Errors
    /// `InvalidInput` for a malformed id, `StorageFailure` if the store fails.
    pub async fn reissue(&self, student_public_id: &str) -> Result<IssuedToken, AccessError> {
        self.reissue_at(student_public_id, Utc::now()).await
    }

    /// Re-issue at an explicit instant.
    ///
    /// # Errors
    /// See [`TokenVerifier::reissue`].
    pub async fn reissue_at(
        &self,
        student_public_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AccessError> {
        let student_public_id = student_public_id.trim();
        if !valid_public_id(student_public_id) {
            return Err(AccessError::InvalidInput("studentId".to_string()));
        }

        let record = self.new_record(student_public_id, now)?;
        let issued = IssuedToken {
            student_public_id: record.student_public_id.clone(),
            secret: record.token_value.clone(),
            expires_at: record.expires_at,
        };
        self.store.replace(record).await.map_err(|err| {
            error!(student_id = student_public_id, "Failed to re-issue result token: {err:#}");
            AccessError::storage(&err)
        })?;

        info!(student_id = student_public_id, "Re-issued result token");
        Ok(issued)
    }

    fn new_record(
        &self,
        student_public_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenRecord, AccessError> {
        let secret = match self.config.shared_secret() {
            Some(secret) => secret.clone(),
            None => generate_token_secret()
                .map(SecretString::from)
                .map_err(|err| AccessError::storage(&err))?,
        };
        TokenRecord::issue(student_public_id, secret, now, self.config.token_ttl()).map_err(
            |err| {
                error!(student_id = student_public_id, "Failed to build token record: {err:#}");
                AccessError::storage(&err)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::token::{AttemptSnapshot, MemoryTokenStore};
    use anyhow::Result;
    use chrono::Duration;
    use std::sync::Mutex;

    const SECRET: &str = "RESULTS-2024";

    fn verifier_with(store: Arc<dyn TokenStore>) -> TokenVerifier {
        let config = AccessConfig::new("https://portal.edugate.dev".to_string())
            .with_shared_secret(Some(SecretString::from(SECRET)));
        TokenVerifier::new(store, config)
    }

    fn memory_verifier() -> (TokenVerifier, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        (verifier_with(store.clone()), store)
    }

    #[tokio::test]
    async fn first_call_creates_record_with_one_attempt() -> Result<()> {
        let (verifier, store) = memory_verifier();
        let result = verifier.verify("S123", "wrong").await;
        assert_eq!(result, Err(AccessError::InvalidToken));
        let record = store.get("S123").await?;
        assert_eq!(record.map(|record| record.attempts), Some(1));

        let (verifier, store) = memory_verifier();
        let result = verifier.verify("S124", SECRET).await;
        assert!(result.is_ok());
        assert_eq!(store.get("S124").await?.map(|record| record.attempts), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn sixth_call_is_exhausted_even_with_correct_token() -> Result<()> {
        let (verifier, store) = memory_verifier();
        for attempt in 1..=5 {
            let result = verifier.verify("S123", SECRET).await;
            assert_eq!(result.map(|verified| verified.attempts), Ok(attempt));
        }
        let result = verifier.verify("S123", SECRET).await;
        assert_eq!(result, Err(AccessError::AttemptsExhausted));
        assert_eq!(store.get("S123").await?.map(|record| record.attempts), Some(6));
        Ok(())
    }

    #[tokio::test]
    async fn expired_record_is_rejected_without_counting() -> Result<()> {
        let (verifier, store) = memory_verifier();
        let start = Utc::now();
        let _ = verifier.verify_at("S123", "wrong", start).await;

        let later = start + Duration::hours(24) + Duration::seconds(1);
        let result = verifier.verify_at("S123", SECRET, later).await;
        assert_eq!(result, Err(AccessError::Expired));
        assert_eq!(store.get("S123").await?.map(|record| record.attempts), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn expiry_boundary_is_inclusive() {
        let (verifier, _store) = memory_verifier();
        let start = Utc::now();
        let _ = verifier.verify_at("S123", "wrong", start).await;
        let result = verifier
            .verify_at("S123", SECRET, start + Duration::hours(24))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unrepresentable_ttl_is_an_error_not_a_panic() -> Result<()> {
        let store = Arc::new(MemoryTokenStore::new());
        let config = AccessConfig::new("https://portal.edugate.dev".to_string())
            .with_shared_secret(Some(SecretString::from(SECRET)))
            .with_token_ttl_seconds(10_000_000_000_000);
        let verifier = TokenVerifier::new(store.clone(), config);

        let result = verifier.verify("S1", "x").await;
        assert!(matches!(result, Err(AccessError::StorageFailure(_))));
        assert!(matches!(
            verifier.reissue("S1").await,
            Err(AccessError::StorageFailure(_))
        ));
        assert!(store.get("S1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_input_touches_nothing() -> Result<()> {
        let (verifier, store) = memory_verifier();
        assert!(matches!(
            verifier.verify("", SECRET).await,
            Err(AccessError::InvalidInput(_))
        ));
        assert!(matches!(
            verifier.verify("S123", "").await,
            Err(AccessError::InvalidInput(_))
        ));
        assert!(store.get("S123").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reissue_resets_attempts_and_expiry() -> Result<()> {
        let (verifier, store) = memory_verifier();
        let start = Utc::now();
        for _ in 0..6 {
            let _ = verifier.verify_at("S123", SECRET, start).await;
        }
        let later = start + Duration::hours(30);
        let issued = verifier.reissue_at("S123", later).await?;
        assert_eq!(issued.expires_at, later + Duration::hours(24));

        let record = store.get("S123").await?;
        assert_eq!(record.as_ref().map(|record| record.attempts), Some(0));
        assert_eq!(record.map(|record| record.created_at), Some(later));

        let result = verifier
            .verify_at("S123", issued.secret.expose_secret(), later)
            .await;
        assert_eq!(result.map(|verified| verified.attempts), Ok(1));
        Ok(())
    }

    #[tokio::test]
    async fn random_secret_when_no_shared_secret() -> Result<()> {
        let store = Arc::new(MemoryTokenStore::new());
        let verifier = TokenVerifier::new(
            store.clone(),
            AccessConfig::new("https://portal.edugate.dev".to_string()),
        );
        let first = verifier.reissue("S1").await?;
        let second = verifier.reissue("S2").await?;
        assert_ne!(first.secret.expose_secret(), second.secret.expose_secret());
        assert_eq!(
            verifier.verify("S1", first.secret.expose_secret()).await.map(|v| v.attempts),
            Ok(1)
        );
        Ok(())
    }

    /// Store wrapper recording the counter value of every live attempt.
    struct CountingStore {
        inner: MemoryTokenStore,
        seen: Mutex<Vec<u32>>,
    }

    #[async_trait::async_trait]
    impl TokenStore for CountingStore {
        async fn get(&self, id: &str) -> anyhow::Result<Option<TokenRecord>> {
            self.inner.get(id).await
        }

        async fn register_attempt(
            &self,
            id: &str,
            now: DateTime<Utc>,
            fresh: TokenRecord,
        ) -> anyhow::Result<AttemptSnapshot> {
            let snapshot = self.inner.register_attempt(id, now, fresh).await?;
            if !snapshot.expired {
                self.seen
                    .lock()
                    .expect("seen lock")
                    .push(snapshot.record.attempts);
            }
            Ok(snapshot)
        }

        async fn replace(&self, record: TokenRecord) -> anyhow::Result<()> {
            self.inner.replace(record).await
        }

        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_are_never_lost() -> Result<()> {
        let store = Arc::new(CountingStore {
            inner: MemoryTokenStore::new(),
            seen: Mutex::new(Vec::new()),
        });
        let verifier = Arc::new(verifier_with(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let verifier = verifier.clone();
            handles.push(tokio::spawn(async move {
                verifier.verify("S123", SECRET).await
            }));
        }

        let mut allowed = 0;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => allowed += 1,
                Err(AccessError::AttemptsExhausted) => exhausted += 1,
                Err(other) => return Err(anyhow::anyhow!("unexpected error: {other}")),
            }
        }

        assert_eq!(allowed, 5);
        assert_eq!(exhausted, 27);

        // Every call saw its own counter value: no update was lost.
        let mut seen = store.seen.lock().expect("seen lock").clone();
        seen.sort_unstable();
        assert_eq!(seen, (1..=32).collect::<Vec<u32>>());
        let compared = seen.iter().filter(|attempts| **attempts <= 5).count();
        assert_eq!(compared, 5);
        assert_eq!(compared, allowed);
        assert_eq!(
            store.inner.get("S123").await?.map(|record| record.attempts),
            Some(32)
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_students_do_not_share_counters() -> Result<()> {
        let (verifier, store) = memory_verifier();
        let verifier = Arc::new(verifier);
        let mut handles = Vec::new();
        for student in ["S1", "S2", "S3", "S4"] {
            for _ in 0..3 {
                let verifier = verifier.clone();
                handles.push(tokio::spawn(async move {
                    verifier.verify(student, SECRET).await
                }));
            }
        }
        for handle in handles {
            assert!(handle.await?.is_ok());
        }
        for student in ["S1", "S2", "S3", "S4"] {
            assert_eq!(store.get(student).await?.map(|record| record.attempts), Some(3));
        }
        Ok(())
    }
}
