//! Table rendering of copy reports and inventories using tabled

use tabled::{
    Table,
    builder::Builder,
    settings::{
        Alignment, Color, Modify,
        object::{Columns, Rows},
        Style,
        width::Width,
    },
};

use crate::inventory::DatabaseInventory;
use crate::migrate::CopyReport;

/// Maximum width for a single column (characters)
const MAX_COLUMN_WIDTH: usize = 60;

/// Table formatter for run results
pub struct TableFormatter {
    /// Enable colored output
    use_colors: bool,
}

impl TableFormatter {
    /// Create a new table formatter with default settings
    pub fn new() -> Self {
        Self::with_colors(false)
    }

    /// Create a new table formatter with color support
    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// One row per collection of a migration run
    ///
    /// # Arguments
    /// * `reports` - Copy reports in processing order
    ///
    /// # Returns
    /// * `String` - Rendered table
    pub fn format_reports(&self, reports: &[CopyReport]) -> String {
        if reports.is_empty() {
            return "(no collections)".to_string();
        }

        let mut builder = Builder::default();
        builder.push_record(["collection", "source", "inserted", "status", "time", "error"]);

        for report in reports {
            builder.push_record([
                report.name.clone(),
                report.source_count.to_string(),
                report.inserted_count.to_string(),
                report.status().to_string(),
                format!("{:.2}s", report.elapsed.as_secs_f64()),
                report.error.clone().unwrap_or_default(),
            ]);
        }

        let mut table = builder.build();
        table.with(Modify::new(Columns::new(1..3)).with(Alignment::right()));
        self.finish(table, 6)
    }

    /// One row per collection of a database
    pub fn format_collections(&self, database: &DatabaseInventory) -> String {
        if database.collections.is_empty() {
            return "(no collections)".to_string();
        }

        let mut builder = Builder::default();
        builder.push_record(["collection", "documents"]);

        for stat in &database.collections {
            let count = match (&stat.document_count, &stat.error) {
                (Some(count), _) => count.to_string(),
                (None, Some(err)) => format!("error: {err}"),
                (None, None) => "-".to_string(),
            };
            builder.push_record([stat.name.clone(), count]);
        }

        let mut table = builder.build();
        table.with(Modify::new(Columns::new(1..2)).with(Alignment::right()));
        self.finish(table, 2)
    }

    fn finish(&self, mut table: Table, columns: usize) -> String {
        table.with(Style::modern());

        // Wrap long values (error messages) rather than truncating them
        for i in 0..columns {
            table.with(Modify::new(Columns::new(i..=i)).with(Width::wrap(MAX_COLUMN_WIDTH)));
        }

        table.with(Modify::new(Rows::first()).with(Alignment::center()));

        if self.use_colors {
            table.modify(Rows::first(), Color::FG_CYAN | Color::BOLD);
        }

        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}
