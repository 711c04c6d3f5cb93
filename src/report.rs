//! Report Assembler
//!
//! Turns the formatted body produced by the writer stage into the terminal
//! [`FormattedReport`]: title and table of contents are lifted from the
//! Markdown headings, citation markers are renumbered 1..N by first
//! appearance and the matching reference list is attached. Pure; nothing
//! in here retries or talks to collaborators.

use crate::citations::{CitationLedger, CitationResolutionWarning, LedgerSnapshot, Reference, ReferenceStatus};
use crate::models::Query;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// 2 for `##`, 3 for `###`
    pub level: u8,
    pub title: String,
    pub anchor: String,
}

/// Terminal artifact of a run; immutable once assembled
#[derive(Debug, Clone, Serialize)]
pub struct FormattedReport {
    pub run_id: Uuid,
    pub query: String,
    pub title: String,
    pub table_of_contents: Vec<TocEntry>,
    /// Markdown body with sequential citation markers
    pub body: String,
    pub references: Vec<Reference>,
    /// One line per section built from partial material
    pub coverage_notes: Vec<String>,
    pub warnings: Vec<CitationResolutionWarning>,
    pub citation_ledger: LedgerSnapshot,
    pub created_at: DateTime<Utc>,
}

impl FormattedReport {
    pub fn unresolved_references(&self) -> impl Iterator<Item = &Reference> {
        self.references
            .iter()
            .filter(|r| r.status == ReferenceStatus::Unresolved)
    }

    /// Render the complete Markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", self.title);

        if !self.table_of_contents.is_empty() {
            out.push_str("## Table of Contents\n\n");
            for entry in &self.table_of_contents {
                let indent = if entry.level > 2 { "  " } else { "" };
                let _ = writeln!(out, "{}- [{}](#{})", indent, entry.title, entry.anchor);
            }
            out.push('\n');
        }

        if !self.coverage_notes.is_empty() {
            for note in &self.coverage_notes {
                let _ = writeln!(out, "> **Note:** {}", note);
            }
            out.push('\n');
        }

        out.push_str(self.body.trim());
        out.push_str("\n\n## References\n\n");

        if self.references.is_empty() {
            out.push_str("*No citations were found for this report.*\n");
        }
        for reference in &self.references {
            let _ = writeln!(out, "{}", render_reference(reference));
        }
        out
    }
}

fn render_reference(reference: &Reference) -> String {
    match (&reference.status, &reference.entry) {
        (ReferenceStatus::Resolved, Some(entry)) => match &entry.source {
            Some(source) => format!("{}. [{}]({})", reference.label, source.title, source.url),
            None => format!(
                "{}. Citation [{}] from research step {}",
                reference.label, entry.canonical_label, entry.origin_step_index
            ),
        },
        _ => format!(
            "- [{}] *unresolved: no recorded source for this marker*",
            reference.label
        ),
    }
}

pub struct ReportAssembler {
    run_id: Uuid,
    query: Query,
    coverage_notes: Vec<String>,
}

impl ReportAssembler {
    pub fn new(run_id: Uuid, query: Query) -> Self {
        Self {
            run_id,
            query,
            coverage_notes: Vec::new(),
        }
    }

    pub fn with_coverage_notes(mut self, notes: Vec<String>) -> Self {
        self.coverage_notes = notes;
        self
    }

    /// `body` carries ledger global ids in its markers.
    pub fn assemble(self, body: &str, ledger: &CitationLedger) -> FormattedReport {
        let (title, body) = split_title(body);
        let title = title.unwrap_or_else(|| format!("Research Report: {}", self.query));

        let renumbered = ledger.renumber(&ledger.resolve(body.trim()));
        let table_of_contents = table_of_contents(&renumbered.text);

        info!(
            references = renumbered.references.len(),
            unresolved = renumbered.warnings.len(),
            sections = table_of_contents.len(),
            "Report assembled"
        );

        FormattedReport {
            run_id: self.run_id,
            query: self.query.as_str().to_string(),
            title,
            table_of_contents,
            body: renumbered.text,
            references: renumbered.references,
            coverage_notes: self.coverage_notes,
            warnings: renumbered.warnings,
            citation_ledger: ledger.snapshot(),
            created_at: Utc::now(),
        }
    }
}

/// Take the first level-1 heading out of the body.
fn split_title(body: &str) -> (Option<String>, String) {
    let mut title = None;
    let mut rest = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if title.is_none() && !in_fence {
            if let Some(text) = line.trim_start().strip_prefix("# ") {
                title = Some(text.trim().to_string());
                continue;
            }
        }
        rest.push(line);
    }

    (title.filter(|t| !t.is_empty()), rest.join("\n"))
}

fn table_of_contents(body: &str) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut in_fence = false;

    for line in body.lines() {
        let line = line.trim_start();
        if line.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let (level, text) = if let Some(t) = line.strip_prefix("### ") {
            (3, t)
        } else if let Some(t) = line.strip_prefix("## ") {
            (2, t)
        } else {
            continue;
        };
        let title = text.trim().trim_end_matches('#').trim().to_string();
        if title.is_empty() {
            continue;
        }

        let base = github_anchor(&title);
        let count = seen.entry(base.clone()).or_insert(0);
        let anchor = if *count == 0 {
            base
        } else {
            format!("{}-{}", base, count)
        };
        *count += 1;

        entries.push(TocEntry { level, title, anchor });
    }
    entries
}

/// GitHub heading slug: lowercase, punctuation dropped, spaces to hyphens.
pub fn github_anchor(heading: &str) -> String {
    heading
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}
