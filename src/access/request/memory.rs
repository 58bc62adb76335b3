use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RequestStore, TokenRequest};

#[derive(Debug, Default)]
pub struct MemoryRequestStore {
    requests: RwLock<Vec<TokenRequest>>,
}

impl MemoryRequestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn insert(&self, request: &TokenRequest) -> Result<()> {
        self.requests.write().await.push(request.clone());
        Ok(())
    }

    async fn list_recent(
        &self,
        student_public_id: &str,
        limit: usize,
    ) -> Result<Vec<TokenRequest>> {
        let requests = self.requests.read().await;
        let mut matching: Vec<TokenRequest> = requests
            .iter()
            .filter(|request| request.student_public_id == student_public_id)
            .cloned()
            .collect();
        // Insertion order breaks ties between identical timestamps.
        matching.reverse();
        matching.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
