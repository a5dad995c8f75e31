//! # audit-trail
//!
//! Change-capture audit trail: field-level diffs on commit, append-only
//! history, pluggable storage.
//!
//! ## Overview
//!
//! `audit-trail` watches entity mutations at the unit-of-work boundary.
//! On every commit it inspects which tracked entities were created,
//! modified, or removed, computes field-level differences between pre- and
//! post-commit states, and persists an immutable, queryable history log —
//! all inside the same transaction as the business mutation.
//!
//! Audited types declare their fields explicitly through the
//! `DescriberRegistry` (no reflection); unregistered types are invisible
//! to the subsystem and commit normally.
//!
//! ## Quick Start
//!
//! ```rust
//! use audit_trail::{
//!     AuditEntity, AuditStore, DescriberRegistry, FieldDescriptor, MemoryEngine,
//!     StaticActor, SystemClock,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Product {
//!     id: u64,
//!     name: String,
//!     units_in_stock: i64,
//! }
//!
//! impl AuditEntity for Product {
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//!     fn adopt_key(&mut self, key: &str) {
//!         if let Ok(id) = key.parse() { self.id = id; }
//!     }
//! }
//!
//! # async fn example() -> audit_trail::Result<()> {
//! let mut registry = DescriberRegistry::new();
//! registry.register::<Product>("Product", vec![
//!     FieldDescriptor::primary_key("Id", |p: &Product| serde_json::json!(p.id)),
//!     FieldDescriptor::field("Name", |p: &Product| serde_json::json!(p.name)),
//!     FieldDescriptor::field("UnitsInStock", |p: &Product| serde_json::json!(p.units_in_stock)),
//! ])?;
//! let registry = Arc::new(registry);
//!
//! let engine = MemoryEngine::with_audit(
//!     registry,
//!     Arc::new(StaticActor("alice".to_string())),
//!     Arc::new(SystemClock),
//! );
//!
//! let mut uow = engine.begin();
//! uow.insert(Product { id: 0, name: "Widget".to_string(), units_in_stock: 10 });
//! let summary = uow.commit().await?;
//!
//! let history = engine.history("Product", &summary.assigned_keys[0]).await?;
//! println!("{} audit records", history.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **CodecValue** — closed set of serializable field-value kinds with
//!   per-kind equality
//! - **DescriberRegistry** — declared field lists per entity type,
//!   populated once at startup
//! - **diff** — classifies before/after states into a `ChangeSet`
//! - **PreCommitHook / HookPipeline** — explicit ordered commit hooks;
//!   `AuditCaptureHook` builds records, `SoftDeleteHook` reclassifies
//!   flag-flip deletions
//! - **AuditStore** — append-only record persistence with ordered history
//! - **MemoryEngine** — reference unit-of-work host for tests and
//!   single-process embedding

pub mod capture;
pub mod describe;
pub mod diff;
pub mod engine;
pub mod error;
pub mod history;
pub mod hooks;
pub mod store;
pub mod types;
pub mod value;

// Re-export core types
pub use capture::{
    AuditCaptureHook, CaptureConfig, Clock, CurrentActor, FixedClock, StaticActor, SystemActor,
    SystemClock,
};
pub use describe::{
    AuditEntity, DescriberRegistry, EntityDescriber, EntityDescription, FieldDescriptor,
    NavigationValue,
};
pub use diff::{diff, ChangeSet};
pub use engine::{CommitSummary, EngineInfo, MemoryEngine, MemoryUnitOfWork};
pub use error::{AuditError, Result};
pub use history::{AuditHistory, ChangeDetail, HistoryEntry};
pub use hooks::{CommitContext, ContextEntry, HookPipeline, PreCommitHook, RowFn, SoftDeleteHook};
pub use store::{AuditStore, MemoryAuditStore};
pub use types::{AuditRecord, EntityState, FieldSnapshot, TrailAction};
pub use value::{CodecValue, UNSERIALIZABLE};
