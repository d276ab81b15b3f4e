/*!
# Report

Per-file outcome of a batch run plus totals, serializable as JSON and
renderable as plain text.
*/

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{Outcome, Status, TransformerStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Inject,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the source root.
    pub path: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Entry {
    pub fn from_outcome(path: impl Into<String>, outcome: &Outcome) -> Self {
        let (error, note) = match outcome.status {
            Status::Error => (outcome.message.clone(), None),
            _ => (None, outcome.message.clone()),
        };
        Self {
            path: path.into(),
            status: outcome.status,
            transformers: outcome.transformers.clone(),
            changes: outcome.journal.changes.clone(),
            warnings: outcome.journal.warnings.clone(),
            error,
            note,
        }
    }

    /// Entry for a file copied without being parsed.
    pub fn copied(path: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: Status::Copied,
            transformers: Vec::new(),
            changes: Vec::new(),
            warnings: Vec::new(),
            error: None,
            note: Some(note.into()),
        }
    }

    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(error.into()),
            note: None,
            ..Self::copied(path, "")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub files_processed: u64,
    pub instrumented: u64,
    pub removed: u64,
    pub skipped: u64,
    pub copied: u64,
    pub errors: u64,
    pub warnings: u64,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: &Entry) {
        self.files_processed += 1;
        self.warnings += entry.warnings.len() as u64;
        match entry.status {
            Status::Instrumented => self.instrumented += 1,
            Status::Removed => self.removed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Copied => self.copied += 1,
            Status::Error => self.errors += 1,
        }
    }

    pub fn merge(&mut self, other: &Summary) {
        self.files_processed += other.files_processed;
        self.instrumented += other.instrumented;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.copied += other.copied;
        self.errors += other.errors;
        self.warnings += other.warnings;
    }

    /// Share of processed files that were rewritten.
    pub fn success_rate(&self) -> f64 {
        if self.files_processed == 0 {
            0.0
        } else {
            ((self.instrumented + self.removed) as f64) / (self.files_processed as f64)
        }
    }

    pub fn success(&self) -> bool {
        self.errors == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub mode: Mode,
    pub source: String,
    pub output: String,
    pub summary: Summary,
    pub files: Vec<Entry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformers: Vec<TransformerStats>,
}

impl Report {
    pub fn new(mode: Mode, source: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            generated_at: Utc::now(),
            version: crate::VERSION.to_string(),
            mode,
            source: source.into(),
            output: output.into(),
            summary: Summary::new(),
            files: Vec::new(),
            transformers: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.summary.add(&entry);
        self.files.push(entry);
    }

    /// Sort entries by path for stable output.
    pub fn sort(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    pub fn has_errors(&self) -> bool {
        !self.summary.success()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "weft {} {:?} {} -> {} ({})",
            self.version,
            self.mode,
            self.source,
            self.output,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for entry in self.files.iter().filter(|e| e.status != Status::Copied || e.error.is_some()) {
            let _ = write!(out, "  {:<12} {}", entry.status.to_string(), entry.path);
            if !entry.transformers.is_empty() {
                let _ = write!(out, " [{}]", entry.transformers.join(", "));
            }
            if let Some(note) = entry.note.as_deref().filter(|n| !n.is_empty()) {
                let _ = write!(out, " ({note})");
            }
            out.push('\n');
            if let Some(error) = &entry.error {
                let _ = writeln!(out, "      error: {error}");
            }
            for warning in &entry.warnings {
                let _ = writeln!(out, "      warning: {warning}");
            }
        }
        let s = &self.summary;
        let _ = writeln!(
            out,
            "{} files: {} instrumented, {} removed, {} skipped, {} copied, {} errors, {} warnings",
            s.files_processed, s.instrumented, s.removed, s.skipped, s.copied, s.errors, s.warnings
        );
        for stats in &self.transformers {
            let _ = writeln!(
                out,
                "  {:<14} applied {}/{} ({:.0}%), avg {:.1} ms",
                stats.name,
                stats.transformations,
                stats.applications,
                stats.success_rate() * 100.0,
                stats.average_time_ms()
            );
        }
        out
    }
}
