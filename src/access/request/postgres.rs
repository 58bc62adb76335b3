//! Postgres-backed request queue storage (`token_requests` table).

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;

use super::{RequestStatus, RequestStore, RequestType, TokenRequest};

#[derive(Clone, Debug)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn request_from_row(row: &PgRow) -> Result<TokenRequest> {
    let request_type: String = row.get("request_type");
    let status: String = row.get("status");
    Ok(TokenRequest {
        id: row.get("id"),
        student_public_id: row.get("student_public_id"),
        class_id: row.get("class_id"),
        request_type: request_type.parse::<RequestType>().map_err(|err| anyhow!(err))?,
        status: status.parse::<RequestStatus>().map_err(|err| anyhow!(err))?,
        requested_at: row.get("requested_at"),
        expires_at: row.get("expires_at"),
    })
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn insert(&self, request: &TokenRequest) -> Result<()> {
        let query = r"
            INSERT INTO token_requests
                (id, student_public_id, class_id, request_type, status, requested_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(request.id)
            .bind(&request.student_public_id)
            .bind(&request.class_id)
            .bind(request.request_type.as_str())
            .bind(request.status.as_str())
            .bind(request.requested_at)
            .bind(request.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert token request")?;
        Ok(())
    }

    async fn list_recent(
        &self,
        student_public_id: &str,
        limit: usize,
    ) -> Result<Vec<TokenRequest>> {
        let query = r"
            SELECT id, student_public_id, class_id, request_type, status, requested_at, expires_at
            FROM token_requests
            WHERE student_public_id = $1
            ORDER BY requested_at DESC
            LIMIT $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let limit = i64::try_from(limit).context("request list limit overflow")?;
        let rows = sqlx::query(query)
            .bind(student_public_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list token requests")?;

        rows.iter().map(request_from_row).collect()
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
