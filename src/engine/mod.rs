//! Host persistence engines
//!
//! The audit subsystem integrates with whatever engine owns the unit of
//! work; this module carries the reference in-memory engine used for tests
//! and single-process embedding. Real hosts implement the same pre-commit
//! hook sequence: `before_write`, identity assignment, `after_identity`,
//! then an atomic apply of rows and queued audit records.

pub mod memory;

pub use memory::{CommitSummary, MemoryEngine, MemoryUnitOfWork};

/// Engine status snapshot
#[derive(Debug, Clone)]
pub struct EngineInfo {
    /// Number of entity tables
    pub tables: usize,
    /// Total stored rows across tables
    pub rows: u64,
    /// Total audit records in the log
    pub audit_records: u64,
}
