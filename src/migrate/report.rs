//! Per-collection reports and the run summary

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use uuid::Uuid;

/// Step of the copy a collection failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPhase {
    Read,
    Insert,
}

/// Outcome of copying one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub name: String,
    pub source_count: u64,
    pub inserted_count: u64,
    pub error: Option<String>,
    pub failed_phase: Option<CopyPhase>,
    pub elapsed: Duration,
}

impl CopyReport {
    pub(crate) fn inserted(name: &str, source_count: u64, inserted: u64, elapsed: Duration) -> Self {
        Self {
            name: name.to_string(),
            source_count,
            inserted_count: inserted,
            error: None,
            failed_phase: None,
            elapsed,
        }
    }

    pub(crate) fn skipped(name: &str, elapsed: Duration) -> Self {
        Self::inserted(name, 0, 0, elapsed)
    }

    pub(crate) fn failed(
        name: &str,
        phase: CopyPhase,
        source_count: u64,
        inserted: u64,
        error: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            source_count,
            inserted_count: inserted,
            error: Some(error),
            failed_phase: Some(phase),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Empty source collection, nothing to insert
    pub fn is_skipped(&self) -> bool {
        self.error.is_none() && self.source_count == 0
    }

    /// Short status word for tables
    pub fn status(&self) -> &'static str {
        match self.failed_phase {
            Some(CopyPhase::Read) => "read failed",
            Some(CopyPhase::Insert) => "insert failed",
            None if self.source_count == 0 => "skipped",
            None => "ok",
        }
    }
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.failed_phase) {
            (Some(err), Some(CopyPhase::Read)) => {
                write!(f, "Error reading {}: {}", self.name, err)
            }
            (Some(err), _) => write!(f, "Error inserting into {}: {}", self.name, err),
            (None, _) if self.source_count == 0 => {
                write!(f, "Skipping {} (0 documents)", self.name)
            }
            (None, _) => write!(
                f,
                "Inserted {} documents into {} (source had {})",
                self.inserted_count, self.name, self.source_count
            ),
        }
    }
}

/// Everything a migration run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    /// Source session shut down without error
    pub source_released: bool,
    /// Target session shut down without error
    pub target_released: bool,
    /// In the order the source store enumerated the collections
    pub reports: Vec<CopyReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    pub fn total_source(&self) -> u64 {
        self.reports.iter().map(|r| r.source_count).sum()
    }

    pub fn total_inserted(&self) -> u64 {
        self.reports.iter().map(|r| r.inserted_count).sum()
    }

    pub fn failed_reports(&self) -> impl Iterator<Item = &CopyReport> {
        self.reports.iter().filter(|r| !r.is_success())
    }

    /// Every collection copied without error
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn report(&self, name: &str) -> Option<&CopyReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    /// Final line of a run
    pub fn summary_line(&self) -> String {
        format!(
            "Migration finished: {} collections, {} succeeded, {} failed, {}/{} documents inserted in {:.1}s",
            self.reports.len(),
            self.succeeded(),
            self.failed(),
            self.total_inserted(),
            self.total_source(),
            self.elapsed.as_secs_f64()
        )
    }
}
