//! Student directory lookups used to validate token requests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Student with this public id enrolled in `class_id`, if any.
    async fn find_student(&self, public_id: &str, class_id: &str) -> Result<Option<Student>>;
}

#[derive(Clone, Debug)]
pub struct PgStudentDirectory {
    pool: PgPool,
}

impl PgStudentDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentDirectory for PgStudentDirectory {
    async fn find_student(&self, public_id: &str, class_id: &str) -> Result<Option<Student>> {
        let query = r"
            SELECT id, full_name, email
            FROM students
            WHERE public_id = $1 AND class_id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(public_id)
            .bind(class_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup student")?;

        Ok(row.map(|row| Student {
            id: row.get("id"),
            name: row.get("full_name"),
            email: row.get("email"),
        }))
    }
}

/// Directory backed by a map of `(public_id, class_id)`.
#[derive(Debug, Default)]
pub struct MemoryStudentDirectory {
    students: RwLock<HashMap<(String, String), Student>>,
}

impl MemoryStudentDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, public_id: &str, class_id: &str, student: Student) {
        self.students
            .write()
            .await
            .insert((public_id.to_string(), class_id.to_string()), student);
    }
}

#[async_trait]
impl StudentDirectory for MemoryStudentDirectory {
    async fn find_student(&self, public_id: &str, class_id: &str) -> Result<Option<Student>> {
        let key = (public_id.to_string(), class_id.to_string());
        Ok(self.students.read().await.get(&key).cloned())
    }
}
