//! Console rendering of run results
//!
//! This module provides:
//! - Migration summaries (report table, statistics and the final line)
//! - Inventory blocks, one per endpoint
//! - Verification results with the sample as relaxed Extended JSON

mod json;
mod stats;
mod table;

pub use json::JsonFormatter;
pub use stats::StatsFormatter;
pub use table::TableFormatter;

use crate::error::Result;
use crate::inventory::InventoryReport;
use crate::migrate::RunSummary;
use crate::verify::VerificationResult;

/// Main formatter for run results
pub struct Formatter {
    /// Enable colored output
    use_colors: bool,

    /// Show timing statistics
    show_timing: bool,
}

impl Formatter {
    /// Create a new formatter
    ///
    /// # Arguments
    /// * `use_colors` - Enable colored output
    /// * `show_timing` - Append run statistics to summaries
    pub fn new(use_colors: bool, show_timing: bool) -> Self {
        Self {
            use_colors,
            show_timing,
        }
    }

    /// Report table, optional statistics and the summary line
    pub fn format_run(&self, summary: &RunSummary) -> String {
        let mut out = Vec::new();
        if !summary.reports.is_empty() {
            out.push(TableFormatter::with_colors(self.use_colors).format_reports(&summary.reports));
        }

        let stats = StatsFormatter::new(self.show_timing, self.show_timing).format(summary);
        if !stats.is_empty() {
            out.push(stats);
        }

        out.push(summary.summary_line());
        out.join("\n")
    }

    /// One block per database of an endpoint, or its error
    pub fn format_inventory(&self, report: &InventoryReport) -> String {
        let mut out = vec![format!("== {} ({}) ==", report.label, report.endpoint)];

        match &report.result {
            Ok(databases) if databases.is_empty() => out.push("(no databases)".to_string()),
            Ok(databases) => {
                let tables = TableFormatter::with_colors(self.use_colors);
                for db in databases {
                    let size = db
                        .size_bytes
                        .map(format_size)
                        .unwrap_or_else(|| "size unknown".to_string());
                    out.push(format!(
                        "Database {}: {}, {} collections, {} documents",
                        db.name,
                        size,
                        db.collections.len(),
                        db.total_documents()
                    ));
                    out.push(tables.format_collections(db));
                }
            }
            Err(e) => out.push(format!("Error: {e}")),
        }

        out.join("\n")
    }

    /// Resolved name, count and sample, or the available names
    pub fn format_verification(&self, result: &VerificationResult) -> Result<String> {
        match result {
            VerificationResult::Found {
                resolved_name,
                document_count,
                sample,
            } => {
                let mut out = vec![
                    format!("Found collection: {resolved_name}"),
                    format!("Document count: {document_count}"),
                ];
                match sample {
                    Some(doc) => {
                        let json = JsonFormatter::new(self.use_colors, 2).format_document(doc)?;
                        out.push(format!("Sample document:\n{json}"));
                    }
                    None => out.push("Sample document: (collection is empty)".to_string()),
                }
                Ok(out.join("\n"))
            }
            VerificationResult::NotFound {
                expected,
                available,
            } => {
                let listed = if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                };
                Ok(format!(
                    "Collection {expected} not found. Available collections: {listed}"
                ))
            }
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(false, true)
    }
}

/// Human readable byte size
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Local;
    use mongodb::bson::doc;
    use uuid::Uuid;

    use crate::error::ConnectionError;
    use crate::inventory::{CollectionStat, DatabaseInventory};
    use crate::migrate::CopyReport;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_run_ends_with_summary_line() {
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            started_at: Local::now(),
            elapsed: Duration::from_secs(2),
            source_released: true,
            target_released: true,
            reports: vec![CopyReport::inserted("users", 2, 2, Duration::ZERO)],
        };
        let out = Formatter::new(false, false).format_run(&summary);
        assert!(out.contains("users"));
        assert!(out.ends_with(
            "Migration finished: 1 collections, 1 succeeded, 0 failed, 2/2 documents inserted in 2.0s"
        ));
        assert!(!out.contains("Run "));
    }

    #[test]
    fn test_inventory_block() {
        let report = InventoryReport {
            label: "source".to_string(),
            endpoint: "mongodb://***@db:27017/shop".to_string(),
            result: Ok(vec![DatabaseInventory {
                name: "shop".to_string(),
                size_bytes: Some(4096),
                collections: vec![CollectionStat {
                    name: "users".to_string(),
                    document_count: Some(7),
                    error: None,
                }],
            }]),
        };
        let out = Formatter::default().format_inventory(&report);
        assert!(out.starts_with("== source (mongodb://***@db:27017/shop) =="));
        assert!(out.contains("Database shop: 4.0 KB, 1 collections, 7 documents"));
    }

    #[test]
    fn test_inventory_error_block() {
        let report = InventoryReport {
            label: "target".to_string(),
            endpoint: "memory://down".to_string(),
            result: Err(ConnectionError::Timeout {
                role: "target".to_string(),
                seconds: 30,
            }
            .into()),
        };
        let out = Formatter::default().format_inventory(&report);
        assert!(out.contains("Error: Connection error: Connecting to target timed out after 30s"));
    }

    #[test]
    fn test_verification_found() {
        let result = VerificationResult::Found {
            resolved_name: "ThemeColor".to_string(),
            document_count: 3,
            sample: Some(doc! { "_id": 1, "hex": "#fff" }),
        };
        let out = Formatter::default().format_verification(&result).unwrap();
        assert!(out.contains("Found collection: ThemeColor"));
        assert!(out.contains("Document count: 3"));
        assert!(out.contains("\"hex\": \"#fff\""));
    }

    #[test]
    fn test_verification_not_found() {
        let result = VerificationResult::NotFound {
            expected: "invoices".to_string(),
            available: vec!["users".to_string(), "orders".to_string()],
        };
        let out = Formatter::default().format_verification(&result).unwrap();
        assert_eq!(
            out,
            "Collection invoices not found. Available collections: users, orders"
        );
    }
}
