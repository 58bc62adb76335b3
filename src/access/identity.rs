//! Identity and profile resolution.
//!
//! The resolver is built once at startup and shared through `Arc`. Lookups that
//! fail surface as errors, never as a silently absent identity.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::{HeaderMap, header::COOKIE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{Instrument, error};
use utoipa::ToSchema;
use uuid::Uuid;

use super::role::Role;
use super::utils::hash_session_token;

pub const SESSION_COOKIE_NAME: &str = "edugate_session";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email_confirmed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Active,
    Pending,
    Suspended,
}

impl ProfileStatus {
    /// Unknown stored values are treated as suspended.
    #[must_use]
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "pending" => Self::Pending,
            _ => Self::Suspended,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub role: Role,
    pub status: ProfileStatus,
}

impl Profile {
    /// Role used for authorization. Inactive profiles get no role privileges.
    #[must_use]
    pub fn effective_role(&self) -> Role {
        match self.status {
            ProfileStatus::Active => self.role,
            ProfileStatus::Pending | ProfileStatus::Suspended => Role::Anonymous,
        }
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Identity behind the request, if any.
    async fn current_identity(&self, headers: &HeaderMap) -> Result<Option<Identity>>;

    /// Profile for an identity, if one exists.
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>>;

    /// Last-login bookkeeping.
    async fn record_login(&self, id: Uuid) -> Result<()>;
}

/// Best-effort last-login update; failures are logged and swallowed.
pub async fn touch_last_login(resolver: &dyn IdentityResolver, id: Uuid) {
    if let Err(err) = resolver.record_login(id).await {
        error!(user_id = %id, "Failed to record last login: {err:#}");
    }
}

/// Extract the session token from the `Cookie` header.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Resolves identities from the session cookie against Postgres.
#[derive(Clone, Debug)]
pub struct SessionIdentityResolver {
    pool: PgPool,
}

impl SessionIdentityResolver {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for SessionIdentityResolver {
    async fn current_identity(&self, headers: &HeaderMap) -> Result<Option<Identity>> {
        let Some(token) = extract_session_token(headers) else {
            return Ok(None);
        };
        // Only the hash is stored; raw tokens never reach the database.
        let token_hash = hash_session_token(&token);
        let query = r"
            SELECT users.id, users.email_confirmed_at
            FROM user_sessions
            JOIN users ON users.id = user_sessions.user_id
            WHERE user_sessions.session_hash = $1
              AND user_sessions.expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        Ok(row.map(|row| {
            let confirmed_at: Option<DateTime<Utc>> = row.get("email_confirmed_at");
            Identity {
                id: row.get("id"),
                email_confirmed: confirmed_at.is_some(),
            }
        }))
    }

    async fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let query = "SELECT role, status FROM profiles WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup profile")?;

        Ok(row.map(|row| {
            let role: String = row.get("role");
            let status: String = row.get("status");
            Profile {
                role: Role::parse_lossy(&role),
                status: ProfileStatus::parse_lossy(&status),
            }
        }))
    }

    async fn record_login(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE profiles SET last_login_at = NOW() WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update last login")?;
        Ok(())
    }
}

/// In-memory resolver keyed by raw session token, for development mode and tests.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    sessions: RwLock<HashMap<String, Identity>>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
    logins: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl StaticIdentityResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session token, optionally with a profile.
    pub async fn insert(&self, token: &str, identity: Identity, profile: Option<Profile>) {
        if let Some(profile) = profile {
            self.profiles.write().await.insert(identity.id, profile);
        }
        self.sessions
            .write()
            .await
            .insert(token.to_string(), identity);
    }

    pub async fn last_login(&self, id: Uuid) -> Option<DateTime<Utc>> {
        self.logins.read().await.get(&id).copied()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn current_identity(&self, headers: &HeaderMap) -> Result<Option<Identity>> {
        let Some(token) = extract_session_token(headers) else {
            return Ok(None);
        };
        Ok(self.sessions.read().await.get(&token).cloned())
    }

    async fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn record_login(&self, id: Uuid) -> Result<()> {
        self.logins.write().await.insert(id, Utc::now());
        Ok(())
    }
}
