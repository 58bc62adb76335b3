//! Postgres-backed token store.
//!
//! Per-student serialization comes from the row lock: the attempt path inserts
//! the record if missing, then takes `SELECT ... FOR UPDATE` before the
//! expiry check and increment, all inside one transaction.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;

use super::{AttemptSnapshot, TokenRecord, TokenStore};

#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<TokenRecord> {
    let attempts: i32 = row.get("attempts");
    let token_value: String = row.get("token_value");
    Ok(TokenRecord {
        student_public_id: row.get("student_public_id"),
        token_value: SecretString::from(token_value),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        attempts: u32::try_from(attempts).context("negative attempt counter")?,
    })
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get(&self, student_public_id: &str) -> Result<Option<TokenRecord>> {
        let query = r"
            SELECT student_public_id, token_value, created_at, expires_at, attempts
            FROM result_tokens
            WHERE student_public_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(student_public_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup result token")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn register_attempt(
        &self,
        student_public_id: &str,
        now: DateTime<Utc>,
        fresh: TokenRecord,
    ) -> Result<AttemptSnapshot> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin token attempt transaction")?;

        let query = r"
            INSERT INTO result_tokens
                (student_public_id, token_value, created_at, expires_at, attempts)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (student_public_id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let inserted = sqlx::query(query)
            .bind(student_public_id)
            .bind(fresh.token_value.expose_secret())
            .bind(fresh.created_at)
            .bind(fresh.expires_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert result token")?;
        let created = inserted.rows_affected() == 1;

        let query = r"
            SELECT student_public_id, token_value, created_at, expires_at, attempts
            FROM result_tokens
            WHERE student_public_id = $1
            FOR UPDATE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(student_public_id)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to lock result token")?
            .ok_or_else(|| anyhow!("result token vanished during attempt"))?;
        let mut record = record_from_row(&row)?;

        if record.is_expired(now) {
            tx.commit().await.context("commit token attempt")?;
            return Ok(AttemptSnapshot {
                record,
                created,
                expired: true,
            });
        }

        let query = r"
            UPDATE result_tokens
            SET attempts = attempts + 1
            WHERE student_public_id = $1
            RETURNING attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(student_public_id)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to increment token attempts")?;
        let attempts: i32 = row.get("attempts");
        record.attempts = u32::try_from(attempts).context("negative attempt counter")?;

        tx.commit().await.context("commit token attempt")?;

        Ok(AttemptSnapshot {
            record,
            created,
            expired: false,
        })
    }

    async fn replace(&self, record: TokenRecord) -> Result<()> {
        let query = r"
            INSERT INTO result_tokens
                (student_public_id, token_value, created_at, expires_at, attempts)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_public_id) DO UPDATE
            SET token_value = EXCLUDED.token_value,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at,
                attempts = EXCLUDED.attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        let attempts = i32::try_from(record.attempts).context("attempt counter overflow")?;
        sqlx::query(query)
            .bind(&record.student_public_id)
            .bind(record.token_value.expose_secret())
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(attempts)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to replace result token")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to ping database")?;
        Ok(())
    }
}
