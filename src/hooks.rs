//! Pre-commit hook pipeline
//!
//! Hooks that inspect or adjust a unit of work run in an explicit, ordered
//! list rather than relying on registration side effects. Each commit
//! attempt invokes two sub-phases on every hook, in push order:
//!
//! 1. `before_write` — runs before the physical write. Soft-delete
//!    reclassification and audit diffing happen here.
//! 2. `after_identity` — runs after the store has assigned identities to
//!    added entities, still before the transaction commits. Deferred audit
//!    records get their primary keys here.
//!
//! The standard pipeline order is soft-delete before audit capture, so the
//! flag flip is visible to the diff.

use crate::describe::{AuditEntity, EntityDescription};
use crate::error::Result;
use crate::types::{AuditRecord, EntityState};
use std::any::Any;
use std::sync::Arc;

/// Serializer from a live entity to its persisted row shape
///
/// Monomorphized per concrete type by the host when it starts tracking the
/// entity, so hooks can stay type-erased.
pub type RowFn = fn(&dyn Any) -> Result<serde_json::Value>;

/// One tracked entity inside a commit attempt
pub struct ContextEntry {
    /// Stable entity type name (table name in the reference host)
    pub name: String,
    /// Pending mutation state; hooks may reclassify it
    pub state: EntityState,
    /// Host-known primary key; `None` until identity assignment for Added
    pub key: Option<String>,
    /// Pre-change description captured by the host when tracking began;
    /// `None` for Added entities and for unregistered types
    pub original: Option<EntityDescription>,
    entity: Box<dyn AuditEntity>,
    row_fn: RowFn,
}

impl ContextEntry {
    /// Build an entry for one tracked entity
    pub fn new(
        name: impl Into<String>,
        state: EntityState,
        key: Option<String>,
        original: Option<EntityDescription>,
        entity: Box<dyn AuditEntity>,
        row_fn: RowFn,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            key,
            original,
            entity,
            row_fn,
        }
    }

    /// The live entity
    pub fn entity(&self) -> &dyn AuditEntity {
        self.entity.as_ref()
    }

    /// Mutable access for hooks that adjust entity state (soft delete)
    pub fn entity_mut(&mut self) -> &mut dyn AuditEntity {
        self.entity.as_mut()
    }

    /// Serialize the entity to its persisted row shape
    pub fn row(&self) -> Result<serde_json::Value> {
        (self.row_fn)(self.entity.as_any())
    }
}

/// Hook-facing view of one commit attempt
///
/// Holds the tracked entries, identity assignments made during the physical
/// insert, audit records deferred until identity assignment, and the queued
/// write set that commits atomically with the business mutation.
#[derive(Default)]
pub struct CommitContext {
    entries: Vec<ContextEntry>,
    assigned_keys: Vec<Option<String>>,
    deferred: Vec<(usize, AuditRecord)>,
    queued: Vec<AuditRecord>,
}

impl CommitContext {
    /// Build a context over the unit of work's tracked entries
    pub fn new(entries: Vec<ContextEntry>) -> Self {
        let assigned_keys = vec![None; entries.len()];
        Self {
            entries,
            assigned_keys,
            deferred: Vec::new(),
            queued: Vec::new(),
        }
    }

    /// Tracked entries in enumeration order
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Mutable tracked entries
    pub fn entries_mut(&mut self) -> &mut [ContextEntry] {
        &mut self.entries
    }

    /// Record the store-assigned key for the entry at `index`
    pub fn assign_key(&mut self, index: usize, key: impl Into<String>) {
        if let Some(slot) = self.assigned_keys.get_mut(index) {
            *slot = Some(key.into());
        }
    }

    /// Store-assigned key for the entry at `index`, if any
    pub fn assigned_key(&self, index: usize) -> Option<&str> {
        self.assigned_keys.get(index).and_then(|k| k.as_deref())
    }

    /// Park a record until identity assignment fills its primary key
    pub fn defer_record(&mut self, index: usize, record: AuditRecord) {
        self.deferred.push((index, record));
    }

    /// Take all deferred records, in the order they were parked
    pub fn take_deferred(&mut self) -> Vec<(usize, AuditRecord)> {
        std::mem::take(&mut self.deferred)
    }

    /// Add a record to the transaction's write set
    pub fn queue_record(&mut self, record: AuditRecord) {
        self.queued.push(record);
    }

    /// Records queued so far, in capture order
    pub fn queued_records(&self) -> &[AuditRecord] {
        &self.queued
    }

    /// Drain the queued write set for the physical commit
    pub fn take_records(&mut self) -> Vec<AuditRecord> {
        std::mem::take(&mut self.queued)
    }
}

/// A pre-commit hook invoked synchronously on the committing task
pub trait PreCommitHook: Send + Sync {
    /// Hook name for logs
    fn name(&self) -> &'static str;

    /// First sub-phase: before the physical write
    fn before_write(&self, ctx: &mut CommitContext) -> Result<()>;

    /// Second sub-phase: after identity assignment, still pre-commit
    fn after_identity(&self, _ctx: &mut CommitContext) -> Result<()> {
        Ok(())
    }
}

/// Explicit, ordered list of pre-commit hooks
///
/// Invocation order is the push order, fixed at construction. A hook error
/// aborts the whole commit — better to refuse the write than to lose its
/// trail silently.
#[derive(Default, Clone)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn PreCommitHook>>,
}

impl HookPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook, returning self for chaining
    pub fn with_hook(mut self, hook: Arc<dyn PreCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True when no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the first sub-phase on every hook in order
    pub fn before_write(&self, ctx: &mut CommitContext) -> Result<()> {
        for hook in &self.hooks {
            tracing::debug!(hook = hook.name(), "Running pre-commit hook");
            hook.before_write(ctx)?;
        }
        Ok(())
    }

    /// Run the second sub-phase on every hook in order
    pub fn after_identity(&self, ctx: &mut CommitContext) -> Result<()> {
        for hook in &self.hooks {
            hook.after_identity(ctx)?;
        }
        Ok(())
    }
}

/// Reclassifies removals of soft-deletable entities as modifications
///
/// An entity whose `soft_delete` flips a flag stays in the store; the change
/// tracker then sees it as `Modified`, so the audit trail records an Update
/// with the flag as the changed field, never a Delete with a full snapshot.
pub struct SoftDeleteHook;

impl PreCommitHook for SoftDeleteHook {
    fn name(&self) -> &'static str {
        "soft-delete"
    }

    fn before_write(&self, ctx: &mut CommitContext) -> Result<()> {
        for entry in ctx.entries_mut() {
            if entry.state == EntityState::Removed && entry.entity_mut().soft_delete() {
                tracing::debug!(entity = %entry.name, "Soft delete, reclassifying as Modified");
                entry.state = EntityState::Modified;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use chrono::Utc;

    struct Supplier {
        is_deleted: bool,
    }

    impl AuditEntity for Supplier {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn soft_delete(&mut self) -> bool {
            self.is_deleted = true;
            true
        }
    }

    struct Product;

    impl AuditEntity for Product {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn row_unsupported(_: &dyn Any) -> Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }

    fn entry(name: &str, state: EntityState, entity: Box<dyn AuditEntity>) -> ContextEntry {
        ContextEntry::new(name, state, None, None, entity, row_unsupported)
    }

    #[test]
    fn test_soft_delete_reclassifies_removed() {
        let mut ctx = CommitContext::new(vec![entry(
            "Supplier",
            EntityState::Removed,
            Box::new(Supplier { is_deleted: false }),
        )]);

        SoftDeleteHook.before_write(&mut ctx).unwrap();

        assert_eq!(ctx.entries()[0].state, EntityState::Modified);
        let supplier = ctx.entries()[0]
            .entity()
            .as_any()
            .downcast_ref::<Supplier>()
            .unwrap();
        assert!(supplier.is_deleted);
    }

    #[test]
    fn test_hard_delete_untouched() {
        let mut ctx = CommitContext::new(vec![entry(
            "Product",
            EntityState::Removed,
            Box::new(Product),
        )]);

        SoftDeleteHook.before_write(&mut ctx).unwrap();
        assert_eq!(ctx.entries()[0].state, EntityState::Removed);
    }

    #[test]
    fn test_pipeline_runs_hooks_in_push_order() {
        struct Recorder(&'static str, Arc<std::sync::Mutex<Vec<&'static str>>>);
        impl PreCommitHook for Recorder {
            fn name(&self) -> &'static str {
                self.0
            }
            fn before_write(&self, _ctx: &mut CommitContext) -> Result<()> {
                self.1.lock().unwrap().push(self.0);
                Ok(())
            }
        }

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = HookPipeline::new()
            .with_hook(Arc::new(Recorder("first", order.clone())))
            .with_hook(Arc::new(Recorder("second", order.clone())));

        let mut ctx = CommitContext::new(Vec::new());
        pipeline.before_write(&mut ctx).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_pipeline_error_short_circuits() {
        struct Failing;
        impl PreCommitHook for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn before_write(&self, _ctx: &mut CommitContext) -> Result<()> {
                Err(AuditError::HostEnumeration("tracker broke".to_string()))
            }
        }
        struct Unreachable;
        impl PreCommitHook for Unreachable {
            fn name(&self) -> &'static str {
                "unreachable"
            }
            fn before_write(&self, _ctx: &mut CommitContext) -> Result<()> {
                panic!("must not run after a failed hook");
            }
        }

        let pipeline = HookPipeline::new()
            .with_hook(Arc::new(Failing))
            .with_hook(Arc::new(Unreachable));

        let mut ctx = CommitContext::new(Vec::new());
        let err = pipeline.before_write(&mut ctx).unwrap_err();
        assert!(matches!(err, AuditError::HostEnumeration(_)));
    }

    #[test]
    fn test_context_key_assignment() {
        let mut ctx = CommitContext::new(vec![entry(
            "Product",
            EntityState::Added,
            Box::new(Product),
        )]);

        assert_eq!(ctx.assigned_key(0), None);
        ctx.assign_key(0, "42");
        assert_eq!(ctx.assigned_key(0), Some("42"));
        assert_eq!(ctx.assigned_key(99), None);
    }

    #[test]
    fn test_context_deferred_records() {
        let mut ctx = CommitContext::new(Vec::new());
        let record = AuditRecord::new(
            "Product",
            "",
            "system",
            Utc::now(),
            crate::types::TrailAction::Create,
        );
        ctx.defer_record(0, record);

        let deferred = ctx.take_deferred();
        assert_eq!(deferred.len(), 1);
        assert_eq!(deferred[0].0, 0);
        assert!(ctx.take_deferred().is_empty());
    }

    #[test]
    fn test_context_queue_and_drain() {
        let mut ctx = CommitContext::new(Vec::new());
        ctx.queue_record(AuditRecord::new(
            "Product",
            "1",
            "system",
            Utc::now(),
            crate::types::TrailAction::Update,
        ));

        assert_eq!(ctx.queued_records().len(), 1);
        let drained = ctx.take_records();
        assert_eq!(drained.len(), 1);
        assert!(ctx.queued_records().is_empty());
    }
}
