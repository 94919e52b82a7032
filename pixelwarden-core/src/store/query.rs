use pixelwarden_model::ScanStatus;
use sqlx::{QueryBuilder, Sqlite};

/// Columns selected whenever a full [`pixelwarden_model::ScanResult`] is read.
pub(crate) const SCAN_RESULT_COLUMNS: &str = "id, file_path, file_size, file_type, file_hash, \
     last_modified, discovered_date, scan_status, is_corrupted, has_warnings, \
     corruption_details, warning_details, scan_tool, scan_output, scan_duration, scan_date, \
     probe_exit_ok, marked_as_good, claim_token, version";

/// Verdict filter applied to completed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictFilter {
    /// Completed, not flagged, or flagged but marked as good.
    Healthy,
    Warning,
    /// Corrupted as reported: the marked-as-good mask applies.
    Corrupted,
    /// Corrupted as stored, regardless of the mask.
    StoredCorrupted,
    MarkedAsGood,
}

/// Filter over stored scan results.
///
/// Every field narrows the selection; an empty query matches every row.
#[derive(Debug, Clone, Default)]
pub struct ResultQuery {
    pub tool: Option<String>,
    pub verdict: Option<VerdictFilter>,
    /// Case-insensitive substring matched against the stored output and
    /// both detail columns.
    pub output_pattern: Option<String>,
    /// Case-insensitive file-name suffix, such as `.gif`.
    pub path_suffix: Option<String>,
    pub status: Option<ScanStatus>,
    pub limit: Option<i64>,
}

impl ResultQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn verdict(mut self, verdict: VerdictFilter) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub fn output_contains(mut self, pattern: impl Into<String>) -> Self {
        self.output_pattern = Some(pattern.into());
        self
    }

    pub fn path_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.path_suffix = Some(suffix.into());
        self
    }

    pub fn status(mut self, status: ScanStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit.max(0));
        self
    }

    /// Appends ` AND ...` clauses for every set field. The builder must
    /// already hold a `WHERE` clause.
    pub(crate) fn push_filters(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(tool) = &self.tool {
            qb.push(" AND scan_tool = ").push_bind(tool.clone());
        }
        if let Some(status) = self.status {
            qb.push(" AND scan_status = ").push_bind(status);
        }
        if let Some(verdict) = self.verdict {
            qb.push(match verdict {
                VerdictFilter::Healthy => {
                    " AND scan_status = 'completed' AND has_warnings = 0 \
                     AND (is_corrupted = 0 OR marked_as_good = 1)"
                }
                VerdictFilter::Warning => {
                    " AND scan_status = 'completed' AND has_warnings = 1"
                }
                VerdictFilter::Corrupted => {
                    " AND scan_status = 'completed' AND is_corrupted = 1 AND marked_as_good = 0"
                }
                VerdictFilter::StoredCorrupted => {
                    " AND scan_status = 'completed' AND is_corrupted = 1"
                }
                VerdictFilter::MarkedAsGood => " AND marked_as_good = 1",
            });
        }
        if let Some(pattern) = &self.output_pattern {
            let like = format!("%{}%", escape_like(pattern));
            qb.push(" AND (scan_output LIKE ")
                .push_bind(like.clone())
                .push(" ESCAPE '\\' OR corruption_details LIKE ")
                .push_bind(like.clone())
                .push(" ESCAPE '\\' OR warning_details LIKE ")
                .push_bind(like)
                .push(" ESCAPE '\\')");
        }
        if let Some(suffix) = &self.path_suffix {
            qb.push(" AND file_path LIKE ")
                .push_bind(format!("%{}", escape_like(suffix)))
                .push(" ESCAPE '\\'");
        }
    }

    pub(crate) fn push_limit(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
    }
}

/// Escapes `LIKE` wildcards so user text matches literally.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
