use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{RequestStatus, RequestStore, RequestType, TokenRequest};
use crate::access::{
    config::AccessConfig, directory::StudentDirectory, error::AccessError,
    utils::valid_public_id,
};

/// A stored request plus the delivery estimate shown to the requester.
#[derive(Clone, Debug)]
pub struct Enqueued {
    pub request: TokenRequest,
    pub estimated_delivery: DateTime<Utc>,
}

pub struct RequestQueue {
    store: Arc<dyn RequestStore>,
    directory: Arc<dyn StudentDirectory>,
    config: AccessConfig,
}

impl RequestQueue {
    pub fn new(
        store: Arc<dyn RequestStore>,
        directory: Arc<dyn StudentDirectory>,
        config: AccessConfig,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.store.ping().await
    }

    /// Record a pending request for a student enrolled in `class_id`.
    ///
    /// # Errors
    /// `InvalidInput` for malformed ids, `NotFound` when the directory has no
    /// such student in that class, `StorageFailure` for backend errors.
    pub async fn enqueue(
        &self,
        student_public_id: &str,
        class_id: &str,
        request_type: RequestType,
    ) -> Result<Enqueued, AccessError> {
        self.enqueue_at(student_public_id, class_id, request_type, Utc::now())
            .await
    }

    /// Enqueue at an explicit instant.
    ///
    /// # Errors
    /// See [`RequestQueue::enqueue`].
    pub async fn enqueue_at(
        &self,
        student_public_id: &str,
        class_id: &str,
        request_type: RequestType,
        now: DateTime<Utc>,
    ) -> Result<Enqueued, AccessError> {
        let student_public_id = student_public_id.trim();
        let class_id = class_id.trim();
        if !valid_public_id(student_public_id) {
            return Err(AccessError::InvalidInput("studentId".to_string()));
        }
        if !valid_public_id(class_id) {
            return Err(AccessError::InvalidInput("classId".to_string()));
        }

        let (Some(expires_at), Some(estimated_delivery)) = (
            now.checked_add_signed(self.config.request_ttl()),
            now.checked_add_signed(self.config.delivery_estimate()),
        ) else {
            error!(student_id = student_public_id, "Token request lifetime out of range");
            return Err(AccessError::StorageFailure(
                "token request lifetime out of range".to_string(),
            ));
        };

        let student = self
            .directory
            .find_student(student_public_id, class_id)
            .await
            .map_err(|err| {
                error!(student_id = student_public_id, "Failed to lookup student: {err:#}");
                AccessError::storage(&err)
            })?;
        if student.is_none() {
            // Same answer for unknown id and wrong class.
            info!(student_id = student_public_id, "Token request for unknown student");
            return Err(AccessError::NotFound);
        }

        let request = TokenRequest {
            id: Uuid::new_v4(),
            student_public_id: student_public_id.to_string(),
            class_id: class_id.to_string(),
            request_type,
            status: RequestStatus::Pending,
            requested_at: now,
            expires_at,
        };
        self.store.insert(&request).await.map_err(|err| {
            error!(student_id = student_public_id, "Failed to store token request: {err:#}");
            AccessError::storage(&err)
        })?;

        info!(
            student_id = student_public_id,
            request_id = %request.id,
            request_type = %request.request_type,
            "Token request queued"
        );
        Ok(Enqueued {
            request,
            estimated_delivery,
        })
    }

    /// Most recent requests for a student, newest first.
    ///
    /// # Errors
    /// `InvalidInput` for a malformed id, `StorageFailure` for backend errors.
    pub async fn list_recent(
        &self,
        student_public_id: &str,
    ) -> Result<Vec<TokenRequest>, AccessError> {
        let student_public_id = student_public_id.trim();
        if !valid_public_id(student_public_id) {
            return Err(AccessError::InvalidInput("studentId".to_string()));
        }
        self.store
            .list_recent(student_public_id, self.config.recent_requests())
            .await
            .map_err(|err| {
                error!(student_id = student_public_id, "Failed to list token requests: {err:#}");
                AccessError::storage(&err)
            })
    }

    /// Whether the student may file another request. No limit is enforced.
    #[must_use]
    pub fn can_request(&self, _student_public_id: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::directory::{MemoryStudentDirectory, Student};
    use crate::access::request::MemoryRequestStore;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::Duration;

    async fn queue_with_student() -> (RequestQueue, Arc<MemoryRequestStore>) {
        let directory = Arc::new(MemoryStudentDirectory::new());
        directory
            .insert(
                "S123",
                "C9",
                Student {
                    id: Uuid::new_v4(),
                    name: "Ada Obi".to_string(),
                    email: None,
                },
            )
            .await;
        let store = Arc::new(MemoryRequestStore::new());
        let queue = RequestQueue::new(
            store.clone(),
            directory,
            AccessConfig::new("http://localhost:3000".to_string()),
        );
        (queue, store)
    }

    #[tokio::test]
    async fn unknown_student_is_not_found() {
        let (queue, _) = queue_with_student().await;
        let result = queue.enqueue("S123", "C8", RequestType::AccessToken).await;
        assert_eq!(result.err(), Some(AccessError::NotFound));
        let result = queue.enqueue("S999", "C9", RequestType::AccessToken).await;
        assert_eq!(result.err(), Some(AccessError::NotFound));
    }

    #[tokio::test]
    async fn matching_student_gets_pending_request() -> Result<()> {
        let (queue, store) = queue_with_student().await;
        let now = Utc::now();
        let enqueued = queue
            .enqueue_at("S123", "C9", RequestType::AccessToken, now)
            .await?;

        assert_eq!(enqueued.request.status, RequestStatus::Pending);
        assert_eq!(enqueued.request.requested_at, now);
        assert_eq!(enqueued.request.expires_at, now + Duration::hours(48));
        assert_eq!(enqueued.estimated_delivery, now + Duration::hours(24));
        assert_eq!(store.list_recent("S123", 5).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn list_recent_caps_at_five() -> Result<()> {
        let (queue, _) = queue_with_student().await;
        let start = Utc::now();
        for minute in 0..8 {
            queue
                .enqueue_at(
                    "S123",
                    "C9",
                    RequestType::TokenReset,
                    start + Duration::minutes(minute),
                )
                .await?;
        }
        let recent = queue.list_recent("S123").await?;
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].requested_at, start + Duration::minutes(7));
        assert!(queue.can_request("S123"));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected_before_lookup() {
        let (queue, _) = queue_with_student().await;
        let result = queue.enqueue("", "C9", RequestType::AccessToken).await;
        assert!(matches!(result, Err(AccessError::InvalidInput(_))));
        let result = queue.enqueue("S123", "../C9", RequestType::AccessToken).await;
        assert!(matches!(result, Err(AccessError::InvalidInput(_))));
    }

    struct BrokenDirectory;

    #[async_trait]
    impl StudentDirectory for BrokenDirectory {
        async fn find_student(&self, _: &str, _: &str) -> Result<Option<Student>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn directory_failure_is_storage_failure() {
        let queue = RequestQueue::new(
            Arc::new(MemoryRequestStore::new()),
            Arc::new(BrokenDirectory),
            AccessConfig::new("http://localhost:3000".to_string()),
        );
        let result = queue.enqueue("S123", "C9", RequestType::AccessToken).await;
        assert!(matches!(result, Err(AccessError::StorageFailure(_))));
    }

    #[tokio::test]
    async fn oversized_lifetime_fails_without_storing() -> Result<()> {
        let directory = Arc::new(MemoryStudentDirectory::new());
        directory
            .insert(
                "S123",
                "C9",
                Student {
                    id: Uuid::new_v4(),
                    name: "Ada Obi".to_string(),
                    email: None,
                },
            )
            .await;
        let store = Arc::new(MemoryRequestStore::new());
        let queue = RequestQueue::new(
            store.clone(),
            directory,
            AccessConfig::new("http://localhost:3000".to_string())
                .with_request_ttl_seconds(10_000_000_000_000),
        );

        let result = queue.enqueue("S123", "C9", RequestType::AccessToken).await;
        assert!(matches!(result, Err(AccessError::StorageFailure(_))));
        assert!(store.list_recent("S123", 5).await?.is_empty());
        Ok(())
    }
}
