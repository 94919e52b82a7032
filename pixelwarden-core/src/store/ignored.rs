use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;

use super::ResultStore;
use crate::error::{IntegrityError, Result};

/// Output fragment that must never mark a file corrupted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IgnoredErrorPattern {
    pub id: i64,
    pub pattern: String,
    pub description: Option<String>,
    pub created_date: DateTime<Utc>,
    pub is_active: bool,
}

impl ResultStore {
    pub async fn add_ignored_pattern(
        &self,
        pattern: &str,
        description: Option<&str>,
    ) -> Result<IgnoredErrorPattern> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(IntegrityError::Internal(
                "ignored pattern must not be empty".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, IgnoredErrorPattern>(
            "INSERT INTO ignored_error_patterns (pattern, description, created_date, is_active) \
             VALUES (?, ?, ?, 1) \
             RETURNING id, pattern, description, created_date, is_active",
        )
        .bind(pattern)
        .bind(description)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        info!(pattern = %row.pattern, "ignored error pattern added");
        Ok(row)
    }

    pub async fn list_ignored_patterns(&self) -> Result<Vec<IgnoredErrorPattern>> {
        let rows = sqlx::query_as::<_, IgnoredErrorPattern>(
            "SELECT id, pattern, description, created_date, is_active \
             FROM ignored_error_patterns ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Pattern text of every active entry, ready for the classifier.
    pub async fn active_ignored_patterns(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT pattern FROM ignored_error_patterns WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn set_ignored_pattern_active(&self, id: i64, active: bool) -> Result<bool> {
        let updated = sqlx::query("UPDATE ignored_error_patterns SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    pub async fn delete_ignored_pattern(&self, id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM ignored_error_patterns WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}
