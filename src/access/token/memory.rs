//! In-memory token store with one lock per student.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{AttemptSnapshot, TokenRecord, TokenStore};

type Slot = Arc<Mutex<Option<TokenRecord>>>;

/// Records live in per-key slots. The outer map lock is only held long enough
/// to find or create a slot, so different students never wait on each other.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, student_public_id: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(student_public_id.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, student_public_id: &str) -> Result<Option<TokenRecord>> {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(student_public_id).cloned()
        };
        match slot {
            Some(slot) => Ok(slot.lock().await.clone()),
            None => Ok(None),
        }
    }

    async fn register_attempt(
        &self,
        student_public_id: &str,
        now: DateTime<Utc>,
        fresh: TokenRecord,
    ) -> Result<AttemptSnapshot> {
        let slot = self.slot(student_public_id).await;
        let mut entry = slot.lock().await;
        let created = entry.is_none();
        let record = entry.get_or_insert(fresh);

        if record.is_expired(now) {
            return Ok(AttemptSnapshot {
                record: record.clone(),
                created,
                expired: true,
            });
        }

        record.attempts = record.attempts.saturating_add(1);
        Ok(AttemptSnapshot {
            record: record.clone(),
            created,
            expired: false,
        })
    }

    async fn replace(&self, record: TokenRecord) -> Result<()> {
        let slot = self.slot(&record.student_public_id).await;
        *slot.lock().await = Some(record);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
