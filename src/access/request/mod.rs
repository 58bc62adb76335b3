//! Requests for a fresh result token.
//!
//! A request never grants access by itself. It is a queue entry an operator
//! fulfils out of band by re-issuing the student's token. Apart from expiry,
//! status transitions belong to that external process.

mod memory;
mod postgres;
mod queue;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

pub use memory::MemoryRequestStore;
pub use postgres::PgRequestStore;
pub use queue::{Enqueued, RequestQueue};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    AccessToken,
    TokenReset,
}

impl RequestType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::TokenReset => "token_reset",
        }
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "access_token" => Ok(Self::AccessToken),
            "token_reset" => Ok(Self::TokenReset),
            other => Err(format!("unknown request type: {other}")),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Expired,
    Rejected,
}

impl RequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Expired => "expired",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "fulfilled" => Ok(Self::Fulfilled),
            "expired" => Ok(Self::Expired),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequest {
    pub id: Uuid,
    pub student_public_id: String,
    pub class_id: String,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRequest {
    /// Status as seen at `now`: a pending request past its expiry reads as expired.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> RequestStatus {
        if self.status == RequestStatus::Pending && now > self.expires_at {
            RequestStatus::Expired
        } else {
            self.status
        }
    }
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: &TokenRequest) -> Result<()>;

    /// At most `limit` requests for the student, newest first.
    async fn list_recent(&self, student_public_id: &str, limit: usize)
    -> Result<Vec<TokenRequest>>;

    async fn ping(&self) -> Result<()>;
}
