// Report persistence (local filesystem)

use crate::report::FormattedReport;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tokio::fs;
use tracing::info;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("unsafe character pattern is valid"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s-]+").expect("separator pattern is valid"));

const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize citations: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist the report and return where it went.
    async fn save(&self, report: &FormattedReport) -> Result<String, StorageError>;
}

/// Writes `<safe_query>_<timestamp>.md` plus a `.citations.json` audit file
pub struct FileReportStore {
    reports_dir: PathBuf,
}

#[derive(Serialize)]
struct CitationAudit<'a> {
    run_id: String,
    query: &'a str,
    references: &'a [crate::citations::Reference],
    warnings: &'a [crate::citations::CitationResolutionWarning],
    ledger: &'a crate::citations::LedgerSnapshot,
}

impl FileReportStore {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    async fn unused_stem(&self, report: &FormattedReport) -> String {
        let stem = format!(
            "{}_{}",
            safe_filename(&report.query),
            report.created_at.format("%Y%m%d_%H%M%S")
        );
        if fs::try_exists(self.reports_dir.join(format!("{}.md", stem)))
            .await
            .unwrap_or(false)
        {
            let run = report.run_id.simple().to_string();
            return format!("{}_{}", stem, &run[..8]);
        }
        stem
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn save(&self, report: &FormattedReport) -> Result<String, StorageError> {
        fs::create_dir_all(&self.reports_dir).await?;

        let stem = self.unused_stem(report).await;
        let report_path = self.reports_dir.join(format!("{}.md", stem));
        let audit_path = self.reports_dir.join(format!("{}.citations.json", stem));

        let audit = CitationAudit {
            run_id: report.run_id.to_string(),
            query: &report.query,
            references: &report.references,
            warnings: &report.warnings,
            ledger: &report.citation_ledger,
        };

        fs::write(&report_path, report.to_markdown()).await?;
        fs::write(&audit_path, serde_json::to_vec_pretty(&audit)?).await?;

        info!(path = %report_path.display(), "Report saved");
        Ok(report_path.display().to_string())
    }
}

/// Lowercase, punctuation to `_`, runs of spaces/hyphens to one `_`,
/// at most 50 characters, no leading or trailing `_`.
pub fn safe_filename(query: &str) -> String {
    let lowered = query.to_lowercase();
    let replaced = UNSAFE_CHARS.replace_all(&lowered, "_");
    let joined = SEPARATORS.replace_all(&replaced, "_");
    let truncated: String = joined.chars().take(MAX_NAME_LEN).collect();
    let trimmed = truncated.trim_matches('_');
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::CitationLedger;
    use crate::models::Query;
    use crate::report::ReportAssembler;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("What is CRISPR?"), "what_is_crispr");
        assert_eq!(safe_filename("solid-state  batteries"), "solid_state_batteries");
        assert_eq!(safe_filename("???"), "report");
        assert!(safe_filename(&"long ".repeat(40)).chars().count() <= 50);
    }

    #[tokio::test]
    async fn test_save_writes_report_and_audit() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileReportStore::new(temp_dir.path().join("reports"));

        let ledger = CitationLedger::new();
        ledger.record("[1]", 1);
        let report = ReportAssembler::new(Uuid::new_v4(), Query::new("Wind power?"))
            .assemble("# Wind\n\n## Findings\nCheap [1].", &ledger);

        let location = store.save(&report).await.unwrap();
        assert!(location.ends_with(".md"));
        assert!(location.contains("wind_power_"));

        let markdown = std::fs::read_to_string(&location).unwrap();
        assert!(markdown.contains("Cheap [1]."));

        let audit_path = location.replace(".md", ".citations.json");
        let audit: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(audit_path).unwrap()).unwrap();
        assert_eq!(audit["ledger"]["entries"][0]["origin_step_index"], 1);
        assert_eq!(audit["references"][0]["status"], "resolved");

        // second save in the same second does not overwrite the first
        let again = store.save(&report).await.unwrap();
        assert_ne!(again, location);
    }
}
