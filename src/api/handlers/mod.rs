//! API handlers for Edugate.
//!
//! Handlers translate HTTP to calls on the access services and map
//! [`AccessError`] onto status codes.

pub mod health;
pub mod results;
pub mod route;
pub mod token_requests;
pub mod types;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::access::AccessError;
use types::ErrorResponse;

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::StorageFailure(detail) => {
                error!("Request failed on storage: {detail}");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        (
            self.status(),
            Json(ErrorResponse {
                ok: false,
                error: message,
            }),
        )
            .into_response()
    }
}

/// Unwrap a JSON body. Any rejection (content type, syntax, missing or
/// mistyped fields) is malformed input.
pub(crate) fn json_payload<T>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, AccessError> {
    payload.map(|Json(payload)| payload).map_err(|rejection| {
        debug!("Rejected request body: {}", rejection.body_text());
        AccessError::InvalidInput("payload".to_string())
    })
}
