//! Request/response types for the results and access endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{RequestStatus, RequestType, Role, TokenRequest};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenRequest {
    pub student_id: String,
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenResponse {
    pub ok: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    pub student_id: String,
    pub class_id: String,
    /// `access_token` (default) or `token_reset`.
    pub request_type: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequestResponse {
    pub request_id: Uuid,
    pub estimated_delivery: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequestView {
    pub id: Uuid,
    pub student_id: String,
    pub class_id: String,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRequestView {
    /// Render a stored request with its status as of `now`.
    pub fn at(request: TokenRequest, now: DateTime<Utc>) -> Self {
        Self {
            status: request.effective_status(now),
            id: request.id,
            student_id: request.student_public_id,
            class_id: request.class_id,
            request_type: request.request_type,
            requested_at: request.requested_at,
            expires_at: request.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequestList {
    pub requests: Vec<TokenRequestView>,
    pub can_request: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequestQuery {
    pub student_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReissueRequest {
    pub student_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReissueResponse {
    pub student_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RouteQuery {
    pub path: String,
    pub required_role: Option<Role>,
}
