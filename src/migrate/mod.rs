//! Bulk copy of every collection from a source database to a target database
//!
//! A run opens both connections, enumerates the source collections and
//! copies them one at a time: read everything, then one ordered bulk insert
//! into the identically named target collection. A collection that fails to
//! read or insert is recorded in its own [`CopyReport`] and the run moves on;
//! only connection and enumeration failures end the run.
//!
//! Reruns are not idempotent. Copying into a target that already holds the
//! same `_id` values fails with duplicate key errors for those collections
//! instead of upserting.

use std::time::Instant;

use chrono::Local;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionDescriptor, ConnectionManager};
use crate::error::{DocshiftError, Result};

pub mod progress;
pub mod report;

pub use progress::ProgressTracker;
pub use report::{CopyPhase, CopyReport, RunSummary};

/// The migration engine
pub struct BulkCopier {
    /// Opens source and target connections
    manager: ConnectionManager,

    /// Show a progress bar across collections
    show_progress: bool,

    /// Suppress per-collection progress lines
    quiet: bool,
}

impl BulkCopier {
    /// Create a new copier
    ///
    /// # Arguments
    /// * `manager` - Connection manager for both sides
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            show_progress: false,
            quiet: false,
        }
    }

    /// Enable or disable the progress bar
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Suppress the "Found ..." line and the per-collection lines
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Copy every source collection into the target
    ///
    /// # Arguments
    /// * `source` - Where to read from
    /// * `target` - Where to write to
    ///
    /// # Returns
    /// * `Result<RunSummary>` - One report per source collection, or the
    ///   fatal error that stopped the run before any collection was copied
    pub async fn migrate(
        &self,
        source: &ConnectionDescriptor,
        target: &ConnectionDescriptor,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Local::now();
        let start = Instant::now();
        info!(%run_id, "Starting migration from {} to {}", source, target);

        let mut source_conn = self.manager.open("source", source).await?;
        let mut target_conn = match self.manager.open("target", target).await {
            Ok(conn) => conn,
            Err(e) => {
                source_conn.close().await;
                return Err(e);
            }
        };

        let outcome = self.copy_all(&source_conn, &target_conn).await;

        let source_released = source_conn.close().await;
        let target_released = target_conn.close().await;

        let reports = outcome?;
        let summary = RunSummary {
            run_id,
            started_at,
            elapsed: start.elapsed(),
            source_released,
            target_released,
            reports,
        };

        info!(%run_id, "{}", summary.summary_line());
        Ok(summary)
    }

    /// Enumerate the source and copy each collection in store order
    async fn copy_all(&self, source: &Connection, target: &Connection) -> Result<Vec<CopyReport>> {
        // Both sides need a database before anything is read
        source.require_database()?;
        target.require_database()?;

        let collections = source.list_collections().await?;

        let tracker = ProgressTracker::new(collections.len() as u64, self.show_progress)
            .with_quiet(self.quiet);
        tracker.println(format!(
            "Found {} collections in {}",
            collections.len(),
            source.require_database()?
        ));
        let mut reports = Vec::with_capacity(collections.len());

        for collection in &collections {
            tracker.println(format!("Migrating collection: {}...", collection.name));

            let report = self.copy_collection(source, target, &collection.name).await;
            tracker.println(report.to_string());
            tracker.collection_done(report.inserted_count);

            reports.push(report);
        }

        tracker.finish();
        Ok(reports)
    }

    /// Copy one collection; never fails, the outcome is in the report
    async fn copy_collection(&self, source: &Connection, target: &Connection, name: &str) -> CopyReport {
        let start = Instant::now();

        let documents = match source.read_all(name).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Reading {} failed: {}", name, e);
                return CopyReport::failed(name, CopyPhase::Read, 0, 0, e.to_string(), start.elapsed());
            }
        };

        let source_count = documents.len() as u64;
        if documents.is_empty() {
            debug!("{} is empty, nothing to insert", name);
            return CopyReport::skipped(name, start.elapsed());
        }

        // Baseline for working out how far a failed insert got
        let before = match target.count_documents(name).await {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("Could not count {} on target before insert: {}", name, e);
                None
            }
        };

        let (inserted, message) = match target.insert_many(name, documents).await {
            Ok(inserted) => {
                debug!("Inserted {}/{} documents into {}", inserted, source_count, name);
                return CopyReport::inserted(name, source_count, inserted, start.elapsed());
            }
            Err(DocshiftError::Write(write)) => (write.inserted, write.message),
            Err(e) => (None, e.to_string()),
        };

        let inserted = match inserted {
            Some(n) => n,
            None => Self::recount(target, name, before).await,
        };
        warn!("Insert into {} stopped after {} documents: {}", name, inserted, message);
        CopyReport::failed(
            name,
            CopyPhase::Insert,
            source_count,
            inserted,
            message,
            start.elapsed(),
        )
    }

    /// Documents a failed insert left behind, from target counts taken
    /// before and after; 0 when either count is unavailable
    async fn recount(target: &Connection, name: &str, before: Option<u64>) -> u64 {
        let Some(before) = before else {
            return 0;
        };
        match target.count_documents(name).await {
            Ok(after) => after.saturating_sub(before),
            Err(e) => {
                warn!("Could not recount {} after failed insert: {}", name, e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use mongodb::bson::{Document, doc};
    use tokio_test::assert_ok;

    use crate::config::ConnectionConfig;
    use crate::error::ConnectionError;
    use crate::store::{MemoryCluster, MemoryDriver};

    const SOURCE: &str = "memory://legacy";
    const TARGET: &str = "memory://atlas";

    fn docs(ids: std::ops::Range<i32>) -> Vec<Document> {
        ids.map(|i| doc! { "_id": i, "label": format!("item-{i}") }).collect()
    }

    fn copier(source: &MemoryCluster, target: &MemoryCluster) -> BulkCopier {
        let driver = MemoryDriver::new()
            .with_cluster(SOURCE, source.clone())
            .with_cluster(TARGET, target.clone());
        BulkCopier::new(ConnectionManager::new(
            Arc::new(driver),
            ConnectionConfig::default(),
        ))
    }

    fn endpoints() -> (ConnectionDescriptor, ConnectionDescriptor) {
        (
            ConnectionDescriptor::new(format!("{SOURCE}/shop"), None),
            ConnectionDescriptor::new(TARGET, Some("shop".to_string())),
        )
    }

    #[tokio::test]
    async fn test_copies_every_collection() {
        let source = MemoryCluster::new()
            .with_collection("shop", "users", docs(0..3))
            .with_collection("shop", "orders", docs(0..5));
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        let summary = assert_ok!(copier(&source, &target).migrate(&src, &dst).await);

        assert!(summary.is_success());
        assert_eq!(summary.reports.len(), 2);
        for report in &summary.reports {
            assert_eq!(report.inserted_count, report.source_count);
        }
        assert_eq!(target.documents("shop", "users").len(), 3);
        assert_eq!(target.documents("shop", "orders").len(), 5);
        assert_eq!(summary.total_inserted(), 8);
    }

    #[tokio::test]
    async fn test_reports_follow_store_order() {
        let source = MemoryCluster::new()
            .with_collection("shop", "zeta", docs(0..1))
            .with_collection("shop", "alpha", docs(0..1))
            .with_collection("shop", "mid", docs(0..1));
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();
        let names: Vec<_> = summary.reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_identity_fields_are_preserved() {
        let original = vec![
            doc! { "_id": mongodb::bson::oid::ObjectId::new(), "k": 1 },
            doc! { "_id": "string-id", "k": 2 },
            doc! { "_id": { "tenant": 4, "seq": 9 }, "k": 3 },
        ];
        let source = MemoryCluster::new().with_collection("shop", "mixed", original.clone());
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        copier(&source, &target).migrate(&src, &dst).await.unwrap();
        assert_eq!(target.documents("shop", "mixed"), original);
    }

    #[tokio::test]
    async fn test_empty_collection_is_skipped() {
        let source = MemoryCluster::new()
            .with_collection("shop", "empty", Vec::new())
            .with_collection("shop", "users", docs(0..2));
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();
        let empty = summary.report("empty").unwrap();
        assert_eq!(empty.inserted_count, 0);
        assert!(empty.error.is_none());
        assert!(empty.is_skipped());
        // only "users" reached the target
        assert_eq!(target.insert_attempts(), 1);
    }

    #[tokio::test]
    async fn test_empty_source_database() {
        let source = MemoryCluster::new();
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();
        assert!(summary.reports.is_empty());
        assert!(summary.is_success());
    }

    async fn isolation_case(failing_first: bool) {
        let (first, second) = if failing_first {
            ("broken", "healthy")
        } else {
            ("healthy", "broken")
        };
        let source = MemoryCluster::new()
            .with_collection("shop", first, docs(0..4))
            .with_collection("shop", second, docs(0..4));
        // seeded identity collision in the target
        let target = MemoryCluster::new().with_collection("shop", "broken", docs(2..3));
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();

        let healthy = summary.report("healthy").unwrap();
        assert!(healthy.is_success());
        assert_eq!(healthy.inserted_count, 4);

        let broken = summary.report("broken").unwrap();
        assert_eq!(broken.failed_phase, Some(CopyPhase::Insert));
        assert_eq!(broken.source_count, 4);
        assert_eq!(broken.inserted_count, 2);
        assert!(broken.error.as_deref().unwrap().contains("DuplicateKey"));

        assert_eq!(summary.failed(), 1);
        assert_eq!(target.documents("shop", "healthy").len(), 4);
    }

    #[tokio::test]
    async fn test_failing_collection_processed_first_is_isolated() {
        isolation_case(true).await;
    }

    #[tokio::test]
    async fn test_failing_collection_processed_last_is_isolated() {
        isolation_case(false).await;
    }

    #[tokio::test]
    async fn test_read_failure_is_isolated() {
        let source = MemoryCluster::new()
            .with_collection("shop", "audit", docs(0..2))
            .with_collection("shop", "users", docs(0..2));
        source.fail_reads_on("audit");
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();
        let audit = summary.report("audit").unwrap();
        assert_eq!(audit.failed_phase, Some(CopyPhase::Read));
        assert!(summary.report("users").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_slow_collection_times_out_without_blocking_others() {
        let source = MemoryCluster::new()
            .with_collection("shop", "slow", docs(0..2))
            .with_collection("shop", "fast", docs(0..2));
        source.delay_reads_on("slow", Duration::from_millis(500));
        let target = MemoryCluster::new();
        let driver = MemoryDriver::new()
            .with_cluster(SOURCE, source.clone())
            .with_cluster(TARGET, target.clone());
        let manager = ConnectionManager::new(Arc::new(driver), ConnectionConfig::default())
            .with_operation_timeout(Duration::from_millis(50));
        let (src, dst) = endpoints();

        let summary = BulkCopier::new(manager).migrate(&src, &dst).await.unwrap();
        let slow = summary.report("slow").unwrap();
        assert!(slow.error.as_deref().unwrap().contains("timed out"));
        assert!(summary.report("fast").unwrap().is_success());
        assert_eq!(target.documents("shop", "fast").len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_source_short_circuits() {
        let target = MemoryCluster::new();
        let driver = MemoryDriver::new().with_cluster(TARGET, target.clone());
        let copier = BulkCopier::new(ConnectionManager::new(
            Arc::new(driver),
            ConnectionConfig::default(),
        ));
        let (src, dst) = endpoints();

        let err = copier.migrate(&src, &dst).await.unwrap_err();
        assert!(matches!(
            err,
            DocshiftError::Connection(ConnectionError::ConnectionFailed { .. })
        ));
        assert!(err.to_string().contains("source"));
        assert_eq!(target.insert_attempts(), 0);
        assert_eq!(target.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_target_releases_source() {
        let source = MemoryCluster::new().with_collection("shop", "users", docs(0..2));
        let driver = MemoryDriver::new().with_cluster(SOURCE, source.clone());
        let copier = BulkCopier::new(ConnectionManager::new(
            Arc::new(driver),
            ConnectionConfig::default(),
        ));
        let (src, dst) = endpoints();

        let err = copier.migrate(&src, &dst).await.unwrap_err();
        assert!(err.to_string().contains("target"));
        assert_eq!(source.sessions_opened(), 1);
        assert_eq!(source.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_connections_closed_after_run() {
        let source = MemoryCluster::new().with_collection("shop", "users", docs(0..2));
        let target = MemoryCluster::new().with_collection("shop", "users", docs(0..1));
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();
        assert!(!summary.is_success());
        assert!(summary.source_released && summary.target_released);
        assert_eq!(source.open_sessions(), 0);
        assert_eq!(target.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_target_database_is_fatal() {
        let source = MemoryCluster::new().with_collection("shop", "users", docs(0..2));
        let target = MemoryCluster::new();
        let src = ConnectionDescriptor::new(format!("{SOURCE}/shop"), None);
        let dst = ConnectionDescriptor::new(TARGET, None);

        let err = copier(&source, &target).migrate(&src, &dst).await.unwrap_err();
        assert!(matches!(err, DocshiftError::Config(_)));
        assert_eq!(target.insert_attempts(), 0);
        assert_eq!(source.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_rerun_is_not_idempotent() {
        let source = MemoryCluster::new()
            .with_collection("shop", "users", docs(0..3))
            .with_collection("shop", "orders", docs(0..2))
            .with_collection("shop", "empty", Vec::new());
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();
        let copier = copier(&source, &target);

        let first = copier.migrate(&src, &dst).await.unwrap();
        assert!(first.is_success());

        // Same identities again: every non-empty collection collides
        let second = copier.migrate(&src, &dst).await.unwrap();
        assert_eq!(second.failed(), 2);
        for name in ["users", "orders"] {
            let report = second.report(name).unwrap();
            assert_eq!(report.inserted_count, 0);
            assert!(report.error.as_deref().unwrap().contains("DuplicateKey"));
        }
        assert!(second.report("empty").unwrap().is_success());
        // no second copy was written
        assert_eq!(target.documents("shop", "users").len(), 3);
    }

    #[tokio::test]
    async fn test_writes_use_exact_collection_names() {
        let source = MemoryCluster::new().with_collection("shop", "ThemeColor", docs(0..2));
        let target = MemoryCluster::new().with_collection("shop", "themecolor", docs(0..2));
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();
        assert!(summary.is_success());
        assert_eq!(
            target.collection_names("shop"),
            vec!["themecolor".to_string(), "ThemeColor".to_string()]
        );
    }

    #[tokio::test]
    async fn test_interrupted_insert_reports_written_prefix() {
        let source = MemoryCluster::new()
            .with_collection("shop", "events", docs(0..5))
            .with_collection("shop", "users", docs(0..2));
        let target = MemoryCluster::new().with_collection("shop", "events", docs(100..103));
        target.interrupt_inserts_on("events", 3);
        let (src, dst) = endpoints();

        let summary = copier(&source, &target).migrate(&src, &dst).await.unwrap();

        let events = summary.report("events").unwrap();
        assert_eq!(events.failed_phase, Some(CopyPhase::Insert));
        assert_eq!(events.source_count, 5);
        assert_eq!(events.inserted_count, 3);
        assert!(events.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(target.documents("shop", "events").len(), 6);
        assert!(summary.report("users").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_fatal_and_releases_both() {
        let source = MemoryCluster::new().with_collection("shop", "users", docs(0..2));
        source.fail_listing();
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        let err = copier(&source, &target).migrate(&src, &dst).await.unwrap_err();
        assert!(matches!(err, DocshiftError::Enumeration(_)));
        assert!(err.is_fatal());
        assert_eq!(target.insert_attempts(), 0);
        assert_eq!(source.open_sessions(), 0);
        assert_eq!(target.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failed_close_is_reported_not_raised() {
        let source = MemoryCluster::new().with_collection("shop", "users", docs(0..2));
        let target = MemoryCluster::new();
        target.fail_shutdown();
        let (src, dst) = endpoints();

        let summary = assert_ok!(copier(&source, &target).migrate(&src, &dst).await);
        assert!(summary.is_success());
        assert!(summary.source_released);
        assert!(!summary.target_released);
        assert_eq!(target.documents("shop", "users").len(), 2);
    }

    #[tokio::test]
    async fn test_quiet_run_still_copies() {
        let source = MemoryCluster::new().with_collection("shop", "users", docs(0..2));
        let target = MemoryCluster::new();
        let (src, dst) = endpoints();

        let summary = copier(&source, &target)
            .with_quiet(true)
            .migrate(&src, &dst)
            .await
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(target.documents("shop", "users").len(), 2);
    }
}
