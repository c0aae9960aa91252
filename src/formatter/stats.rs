//! Timing and connection status of a migration run

use crate::migrate::RunSummary;

/// Statistics formatter for a migration run
pub struct StatsFormatter {
    /// Show elapsed time
    show_time: bool,

    /// Show connection release status
    show_connections: bool,
}

impl StatsFormatter {
    /// Create a new statistics formatter
    ///
    /// # Arguments
    /// * `show_time` - Show elapsed time
    /// * `show_connections` - Show connection release status
    pub fn new(show_time: bool, show_connections: bool) -> Self {
        Self {
            show_time,
            show_connections,
        }
    }

    /// Format run statistics
    ///
    /// # Arguments
    /// * `summary` - Run summary
    ///
    /// # Returns
    /// * `String` - Statistics line, empty when nothing is shown
    pub fn format(&self, summary: &RunSummary) -> String {
        let mut parts = Vec::new();

        if self.show_time {
            parts.push(format!(
                "Run {} started {}, took {}ms",
                summary.run_id,
                summary.started_at.format("%Y-%m-%d %H:%M:%S"),
                summary.elapsed.as_millis()
            ));
        }

        if self.show_connections {
            parts.push(format!(
                "source {}, target {}",
                connection_state(summary.source_released),
                connection_state(summary.target_released)
            ));
        }

        parts.join(", ")
    }
}

fn connection_state(released: bool) -> &'static str {
    if released { "released" } else { "release failed" }
}
