//! Spot-check of one replicated collection
//!
//! Resolves a collection name on the target tolerating case drift, then
//! reports its document count and one sample document. Read-only.

use mongodb::bson::Document;
use tracing::{debug, info};

use crate::connection::{CollectionDescriptor, Connection, ConnectionDescriptor, ConnectionManager};
use crate::error::Result;

/// Result of a spot-check
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    Found {
        /// Name as stored on the target, which may differ in case
        resolved_name: String,
        document_count: u64,
        /// First document the store returned, if any
        sample: Option<Document>,
    },
    NotFound {
        expected: String,
        /// Every collection of the target database, in store order
        available: Vec<String>,
    },
}

impl VerificationResult {
    pub fn is_found(&self) -> bool {
        matches!(self, VerificationResult::Found { .. })
    }
}

/// Pick the collection matching `expected`
///
/// An exact match wins, otherwise the first case-insensitive match in the
/// order given.
pub fn resolve_collection<'a>(
    collections: &'a [CollectionDescriptor],
    expected: &str,
) -> Option<&'a CollectionDescriptor> {
    collections.iter().find(|c| c.name == expected).or_else(|| {
        let folded = expected.to_lowercase();
        collections
            .iter()
            .find(|c| c.name.to_lowercase() == folded)
    })
}

pub struct SpotCheckVerifier {
    manager: ConnectionManager,
}

impl SpotCheckVerifier {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Check that `expected` exists on the target and sample it
    ///
    /// The connection is released on every path, including errors.
    pub async fn verify(
        &self,
        target: &ConnectionDescriptor,
        expected: &str,
    ) -> Result<VerificationResult> {
        let mut conn = self.manager.open("target", target).await?;
        let outcome = self.check(&conn, expected).await;
        conn.close().await;
        outcome
    }

    async fn check(&self, conn: &Connection, expected: &str) -> Result<VerificationResult> {
        let database = conn.require_database()?;
        let collections = conn.list_collections().await?;

        let Some(resolved) = resolve_collection(&collections, expected) else {
            info!("Collection {} not found in {}", expected, database);
            return Ok(VerificationResult::NotFound {
                expected: expected.to_string(),
                available: collections.into_iter().map(|c| c.name).collect(),
            });
        };

        if resolved.name != expected {
            debug!("Resolved {} to {}", expected, resolved.name);
        }

        let document_count = conn.count_documents(&resolved.name).await?;
        let sample = conn.find_one(&resolved.name).await?;

        Ok(VerificationResult::Found {
            resolved_name: resolved.name.clone(),
            document_count,
            sample,
        })
    }
}
