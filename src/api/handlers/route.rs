//! Route authorization decision for page requests.

use axum::{
    Json,
    extract::{Extension, Query, rejection::QueryRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, warn};

use super::types::{ErrorResponse, RouteQuery};
use crate::access::{
    AccessConfig, AccessError, Decision, GuardInput, IdentityResolver, IdentityState,
    ProfileState, RouteTable, guard,
    identity::touch_last_login,
    role::{LOGIN_ROUTE, normalize_path},
};

/// Decide whether the caller may view `path`, or where to send them instead.
#[utoipa::path(
    get,
    path = "/v1/access/route",
    params(
        ("path" = String, Query, description = "Requested page path"),
        ("requiredRole" = Option<String>, Query, description = "Role the page demands")
    ),
    responses(
        (status = 200, description = "Guard decision", body = Decision),
        (status = 400, description = "Malformed query", body = ErrorResponse)
    ),
    tag = "access"
)]
pub async fn decide(
    headers: HeaderMap,
    resolver: Extension<Arc<dyn IdentityResolver>>,
    table: Extension<Arc<RouteTable>>,
    config: Extension<AccessConfig>,
    query: Result<Query<RouteQuery>, QueryRejection>,
) -> impl IntoResponse {
    let query = match query {
        Ok(Query(query)) => query,
        Err(err) => return AccessError::InvalidInput(err.body_text()).into_response(),
    };

    let (identity, profile) =
        resolve(&headers, resolver.0.as_ref(), config.profile_timeout()).await;

    let decision = guard::evaluate(
        &table,
        &GuardInput {
            path: &query.path,
            identity: &identity,
            profile: &profile,
            required_role: query.required_role,
        },
    );

    if let (IdentityState::Present(identity), ProfileState::Ready(_)) = (&identity, &profile)
        && normalize_path(&query.path) == Some(LOGIN_ROUTE)
    {
        touch_last_login(resolver.0.as_ref(), identity.id).await;
    }

    if let Decision::Redirect { to, replace } = &decision {
        debug!(path = %query.path, to = %to, replace, "Guard redirect");
    }

    (StatusCode::OK, Json(decision)).into_response()
}

/// Resolve identity and profile. Errors and a profile that misses the wait
/// window both read as absent so the guard fails closed.
async fn resolve(
    headers: &HeaderMap,
    resolver: &dyn IdentityResolver,
    profile_timeout: Duration,
) -> (IdentityState, ProfileState) {
    let identity = match resolver.current_identity(headers).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return (IdentityState::Absent, ProfileState::Missing),
        Err(err) => {
            error!("Failed to resolve identity: {err:#}");
            return (IdentityState::Absent, ProfileState::Missing);
        }
    };

    let profile = match tokio::time::timeout(profile_timeout, resolver.profile(identity.id)).await
    {
        Ok(Ok(Some(profile))) => ProfileState::Ready(profile),
        Ok(Ok(None)) => ProfileState::Missing,
        Ok(Err(err)) => {
            error!(user_id = %identity.id, "Failed to load profile: {err:#}");
            ProfileState::Missing
        }
        Err(_) => {
            warn!(user_id = %identity.id, "Profile lookup timed out");
            ProfileState::Missing
        }
    };

    (IdentityState::Present(identity), profile)
}
