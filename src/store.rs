//! Audit store — append-only persistence of audit records
//!
//! The store exposes append and read paths only; records are never updated
//! or deleted once committed. `append` is expected to be atomic with the
//! caller's transaction — hosts with a real transaction (like the memory
//! engine) perform the append inside their own commit critical section and
//! use this trait for the read path.

use crate::error::{AuditError, Result};
use crate::types::AuditRecord;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Trait for audit record backends
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a batch of records atomically
    async fn append(&self, records: &[AuditRecord]) -> Result<()>;

    /// Ordered history for one entity identity
    ///
    /// Sorted by `timestamp_utc` descending; records with equal timestamps
    /// preserve commit order.
    async fn history(&self, entity_name: &str, primary_key: &str) -> Result<Vec<AuditRecord>>;

    /// Recent records across all instances of one entity type
    ///
    /// An empty entity name is a store error, same as `history`.
    async fn history_for_type(&self, entity_name: &str, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Total number of stored records
    async fn count(&self) -> Result<u64>;
}

/// Order a filtered history slice: timestamp descending, stable on ties
///
/// Input must be in insertion (commit) order; the stable sort then keeps
/// equal-timestamp records in commit order.
pub(crate) fn order_history(mut records: Vec<AuditRecord>) -> Vec<AuditRecord> {
    records.sort_by(|a, b| b.timestamp_utc.cmp(&a.timestamp_utc));
    records
}

/// In-memory audit store for development and testing
///
/// Keeps records in a `Vec` in commit order. Append-only by construction.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, records: &[AuditRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut log = self.records.write().await;
        log.extend_from_slice(records);
        tracing::debug!(appended = records.len(), total = log.len(), "Audit records appended");
        Ok(())
    }

    async fn history(&self, entity_name: &str, primary_key: &str) -> Result<Vec<AuditRecord>> {
        if entity_name.is_empty() || primary_key.is_empty() {
            return Err(AuditError::Store(
                "History query requires an entity name and primary key".to_string(),
            ));
        }
        let log = self.records.read().await;
        let matched: Vec<AuditRecord> = log
            .iter()
            .filter(|r| r.entity_name == entity_name && r.primary_key == primary_key)
            .cloned()
            .collect();
        Ok(order_history(matched))
    }

    async fn history_for_type(&self, entity_name: &str, limit: usize) -> Result<Vec<AuditRecord>> {
        if entity_name.is_empty() {
            return Err(AuditError::Store(
                "History query requires an entity name".to_string(),
            ));
        }
        let log = self.records.read().await;
        let matched: Vec<AuditRecord> = log
            .iter()
            .filter(|r| r.entity_name == entity_name)
            .cloned()
            .collect();
        let mut ordered = order_history(matched);
        ordered.truncate(limit);
        Ok(ordered)
    }

    async fn count(&self) -> Result<u64> {
        let log = self.records.read().await;
        Ok(log.len() as u64)
    }
}
