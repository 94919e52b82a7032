use std::sync::Arc;

use pixelwarden_model::{ScanStatus, Verdict};
use serde::Serialize;
use tracing::{info, warn};

use super::{Classifier, ClassifierInput};
use crate::error::{IntegrityError, Result};
use crate::store::{ResultQuery, ResultStore};

/// One stored verdict that would change under the current rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictChange {
    pub id: i64,
    pub file_path: String,
    /// Row version the change was computed against.
    pub version: i64,
    pub before: Verdict,
    pub after: Verdict,
    pub rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyReport {
    /// Completed rows with stored output that were re-evaluated.
    pub examined: usize,
    pub changes: Vec<VerdictChange>,
    /// Rows written. Zero for a dry run.
    pub applied: usize,
}

/// Re-derives verdicts from stored probe output without re-running probes.
#[derive(Debug, Clone)]
pub struct Reclassifier {
    store: ResultStore,
    classifier: Arc<Classifier>,
}

impl Reclassifier {
    pub fn new(store: ResultStore, classifier: Arc<Classifier>) -> Self {
        Self { store, classifier }
    }

    /// Computes the verdict changes for rows matching `query`. Nothing is written.
    pub async fn plan(&self, query: &ResultQuery) -> Result<ReclassifyReport> {
        let ignored = self.store.active_ignored_patterns().await?;
        let classifier = self.classifier.with_ignored_patterns(&ignored);

        let query = query.clone().status(ScanStatus::Completed);
        let rows = self.store.query(&query).await?;

        let mut report = ReclassifyReport::default();
        for row in rows {
            let (Some(output), Some(before)) = (row.scan_output.as_deref(), row.stored_verdict())
            else {
                continue;
            };
            report.examined += 1;

            let tool = row.scan_tool.as_deref().unwrap_or_default();
            let classification = classifier.classify(&ClassifierInput {
                tool,
                path: &row.file_path,
                exit_ok: row.probe_exit_ok.unwrap_or(true),
                output,
            });

            if classification.verdict != before {
                report.changes.push(VerdictChange {
                    id: row.id,
                    file_path: row.file_path.clone(),
                    version: row.version,
                    before,
                    after: classification.verdict,
                    rule: classification.rule,
                });
            }
        }
        Ok(report)
    }

    /// Plans and writes the changes in one transaction.
    pub async fn apply(&self, query: &ResultQuery) -> Result<ReclassifyReport> {
        let report = self.plan(query).await?;
        self.commit(report).await
    }

    /// Writes a previously computed plan. Every update is guarded by the row
    /// version it was planned against; if any row moved on in between,
    /// nothing is written.
    pub async fn commit(&self, mut report: ReclassifyReport) -> Result<ReclassifyReport> {
        if report.changes.is_empty() {
            return Ok(report);
        }

        let mut tx = self.store.pool().begin().await?;
        let mut applied = 0;
        for change in &report.changes {
            let columns = change.after.columns();
            let updated = sqlx::query(
                "UPDATE scan_results SET is_corrupted = ?, has_warnings = ?, \
                 corruption_details = ?, warning_details = ?, version = version + 1 \
                 WHERE id = ? AND version = ? AND scan_status = 'completed'",
            )
            .bind(columns.is_corrupted)
            .bind(columns.has_warnings)
            .bind(columns.corruption_details)
            .bind(columns.warning_details)
            .bind(change.id)
            .bind(change.version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                break;
            }
            applied += 1;
        }

        let expected = report.changes.len();
        if applied != expected {
            tx.rollback().await?;
            warn!(expected, applied, "reclassification rolled back on version conflict");
            return Err(IntegrityError::ReclassifyPartialFailure { expected, applied });
        }

        tx.commit().await?;
        report.applied = applied;
        info!(
            examined = report.examined,
            applied, "reclassification applied"
        );
        Ok(report)
    }
}
