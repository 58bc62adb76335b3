//! Typed failures returned by the access-control services.

use axum::http::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    Expired,
    #[error("Too many attempts")]
    AttemptsExhausted,
    #[error("Student not found")]
    NotFound,
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Profile missing")]
    ProfileMissing,
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl AccessError {
    /// HTTP status used when the error crosses the API boundary.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken | Self::Unauthorized | Self::ProfileMissing => {
                StatusCode::UNAUTHORIZED
            }
            Self::Expired | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::AttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap a backing-store error. The detail is kept for logs only.
    pub(crate) fn storage(err: &anyhow::Error) -> Self {
        Self::StorageFailure(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::AccessError;
    use axum::http::StatusCode;

    #[test]
    fn verification_errors_map_to_distinct_statuses() {
        assert_eq!(AccessError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AccessError::Expired.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AccessError::AttemptsExhausted.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AccessError::InvalidInput("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn request_errors_map_to_statuses() {
        assert_eq!(AccessError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AccessError::StorageFailure("down".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_wraps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("failed to load token");
        let wrapped = AccessError::storage(&err);
        assert_eq!(
            wrapped,
            AccessError::StorageFailure("failed to load token: connection refused".to_string())
        );
    }
}
