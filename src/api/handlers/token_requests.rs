//! Requests for a fresh result token.

use axum::{
    Json,
    extract::{
        Extension, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use std::sync::Arc;

use super::json_payload;
use super::types::{
    CreateTokenRequest, CreateTokenRequestResponse, ErrorResponse, TokenRequestList,
    TokenRequestQuery, TokenRequestView,
};
use crate::access::{AccessError, RequestQueue, RequestType};

/// Queue a request for a new token. The student must exist in the given class.
#[utoipa::path(
    post,
    path = "/v1/results/token-requests",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Request queued", body = CreateTokenRequestResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 404, description = "No such student in that class", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "results"
)]
pub async fn create(
    queue: Extension<Arc<RequestQueue>>,
    payload: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request: CreateTokenRequest = match json_payload(payload) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    let request_type = match request.request_type.as_deref() {
        None => RequestType::default(),
        Some(value) => match value.parse::<RequestType>() {
            Ok(request_type) => request_type,
            Err(err) => return AccessError::InvalidInput(err).into_response(),
        },
    };

    match queue
        .enqueue(&request.student_id, &request.class_id, request_type)
        .await
    {
        Ok(enqueued) => (
            StatusCode::CREATED,
            Json(CreateTokenRequestResponse {
                request_id: enqueued.request.id,
                estimated_delivery: enqueued.estimated_delivery,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Most recent requests for a student, newest first.
#[utoipa::path(
    get,
    path = "/v1/results/token-requests",
    params(
        ("studentId" = String, Query, description = "Student public identifier")
    ),
    responses(
        (status = 200, description = "Recent requests", body = TokenRequestList),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "results"
)]
pub async fn list(
    queue: Extension<Arc<RequestQueue>>,
    query: Result<Query<TokenRequestQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Ok(Query(query)) = query else {
        return AccessError::InvalidInput("studentId".to_string()).into_response();
    };

    match queue.list_recent(&query.student_id).await {
        Ok(requests) => {
            let now = Utc::now();
            let can_request = queue.can_request(&query.student_id);
            let requests = requests
                .into_iter()
                .map(|request| TokenRequestView::at(request, now))
                .collect();
            (
                StatusCode::OK,
                Json(TokenRequestList {
                    requests,
                    can_request,
                }),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}
