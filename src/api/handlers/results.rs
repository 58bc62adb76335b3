//! Result token verification and operator re-issue.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{error, warn};

use super::json_payload;
use super::types::{
    ErrorResponse, ReissueRequest, ReissueResponse, VerifyTokenRequest, VerifyTokenResponse,
};
use crate::access::{AccessError, IdentityResolver, Role, TokenVerifier};

/// Check a result token for a student. Every call against a live token counts
/// as an attempt, including a successful one.
#[utoipa::path(
    post,
    path = "/v1/results/verify",
    request_body = VerifyTokenRequest,
    responses(
        (status = 200, description = "Token accepted", body = VerifyTokenResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 403, description = "Token expired", body = ErrorResponse),
        (status = 429, description = "Attempts exhausted", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "results"
)]
pub async fn verify(
    verifier: Extension<Arc<TokenVerifier>>,
    payload: Result<Json<VerifyTokenRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request: VerifyTokenRequest = match json_payload(payload) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    match verifier.verify(&request.student_id, &request.token).await {
        Ok(verified) => (
            StatusCode::OK,
            Json(VerifyTokenResponse {
                ok: true,
                expires_at: verified.expires_at,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Replace a student's token with a fresh secret and a zeroed attempt counter.
#[utoipa::path(
    post,
    path = "/v1/results/tokens/reissue",
    request_body = ReissueRequest,
    responses(
        (status = 200, description = "Token re-issued", body = ReissueResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "results"
)]
pub async fn reissue(
    headers: HeaderMap,
    verifier: Extension<Arc<TokenVerifier>>,
    resolver: Extension<Arc<dyn IdentityResolver>>,
    payload: Result<Json<ReissueRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers, resolver.0.as_ref()).await {
        return err.into_response();
    }

    let request: ReissueRequest = match json_payload(payload) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    match verifier.reissue(&request.student_id).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(ReissueResponse {
                student_id: issued.student_public_id,
                token: issued.secret.expose_secret().to_string(),
                expires_at: issued.expires_at,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn require_admin(
    headers: &HeaderMap,
    resolver: &dyn IdentityResolver,
) -> Result<(), AccessError> {
    let identity = resolver.current_identity(headers).await.map_err(|err| {
        error!("Failed to resolve identity: {err:#}");
        AccessError::storage(&err)
    })?;
    let Some(identity) = identity else {
        return Err(AccessError::Unauthorized);
    };

    let profile = resolver.profile(identity.id).await.map_err(|err| {
        error!(user_id = %identity.id, "Failed to load profile: {err:#}");
        AccessError::storage(&err)
    })?;
    let Some(profile) = profile else {
        return Err(AccessError::ProfileMissing);
    };

    if profile.effective_role() == Role::Admin {
        Ok(())
    } else {
        warn!(user_id = %identity.id, role = %profile.effective_role(), "Re-issue denied");
        Err(AccessError::Forbidden)
    }
}
