//! In-memory persistence engine — the reference unit-of-work host
//!
//! Stores entity rows as JSON snapshots in per-type tables and keeps the
//! audit log in the same state behind one lock, so a commit applies rows
//! and audit records in a single critical section. Nothing is durable
//! until `commit` succeeds; dropping a unit of work discards everything it
//! tracked.

use crate::capture::{AuditCaptureHook, Clock, CurrentActor};
use crate::describe::{short_type_name, AuditEntity, DescriberRegistry};
use crate::engine::EngineInfo;
use crate::error::{AuditError, Result};
use crate::hooks::{CommitContext, ContextEntry, HookPipeline, SoftDeleteHook};
use crate::store::{order_history, AuditStore};
use crate::types::{AuditRecord, EntityState};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct EngineState {
    /// entity name → primary key → row snapshot
    tables: HashMap<String, BTreeMap<String, serde_json::Value>>,
    /// entity name → next identity value
    next_ids: HashMap<String, u64>,
    /// append-only audit log in commit order
    log: Vec<AuditRecord>,
}

impl EngineState {
    fn next_id(&self, entity_name: &str) -> u64 {
        self.next_ids.get(entity_name).copied().unwrap_or(1)
    }
}

/// Outcome of a committed unit of work
#[derive(Debug, Clone, Default)]
pub struct CommitSummary {
    /// Number of entity mutations applied
    pub applied: usize,
    /// Number of audit records written with them
    pub audit_records: usize,
    /// Store-assigned keys for inserted entities, in insertion order
    pub assigned_keys: Vec<String>,
}

/// In-memory engine with a pre-commit hook pipeline
pub struct MemoryEngine {
    registry: Arc<DescriberRegistry>,
    pipeline: HookPipeline,
    state: Arc<RwLock<EngineState>>,
}

impl MemoryEngine {
    /// Create an engine with an explicit hook pipeline
    pub fn new(registry: Arc<DescriberRegistry>, pipeline: HookPipeline) -> Self {
        Self {
            registry,
            pipeline,
            state: Arc::new(RwLock::new(EngineState::default())),
        }
    }

    /// Create an engine with the standard pipeline: soft-delete, then
    /// audit capture
    pub fn with_audit(
        registry: Arc<DescriberRegistry>,
        actor: Arc<dyn CurrentActor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pipeline = HookPipeline::new()
            .with_hook(Arc::new(SoftDeleteHook))
            .with_hook(Arc::new(AuditCaptureHook::new(
                registry.clone(),
                actor,
                clock,
            )));
        Self::new(registry, pipeline)
    }

    /// Open a unit of work
    pub fn begin(&self) -> MemoryUnitOfWork {
        MemoryUnitOfWork {
            registry: self.registry.clone(),
            pipeline: self.pipeline.clone(),
            state: self.state.clone(),
            tracked: Vec::new(),
        }
    }

    /// Fetch one stored entity by key
    pub async fn fetch<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + 'static,
    {
        let name = table_name::<T>(&self.registry);
        let state = self.state.read().await;
        match state.tables.get(&name).and_then(|t| t.get(key)) {
            Some(row) => Ok(Some(serde_json::from_value(row.clone())?)),
            None => Ok(None),
        }
    }

    /// Raw row snapshot, if present
    pub async fn row(&self, entity_name: &str, key: &str) -> Option<serde_json::Value> {
        let state = self.state.read().await;
        state.tables.get(entity_name).and_then(|t| t.get(key)).cloned()
    }

    /// Engine status
    pub async fn info(&self) -> EngineInfo {
        let state = self.state.read().await;
        EngineInfo {
            tables: state.tables.len(),
            rows: state.tables.values().map(|t| t.len() as u64).sum(),
            audit_records: state.log.len() as u64,
        }
    }
}

#[async_trait]
impl AuditStore for MemoryEngine {
    /// Standalone append, for records produced outside a unit of work
    ///
    /// Records captured by the pipeline are written by `commit` itself,
    /// atomically with the rows they describe.
    async fn append(&self, records: &[AuditRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        state.log.extend_from_slice(records);
        Ok(())
    }

    async fn history(&self, entity_name: &str, primary_key: &str) -> Result<Vec<AuditRecord>> {
        if entity_name.is_empty() || primary_key.is_empty() {
            return Err(AuditError::Store(
                "History query requires an entity name and primary key".to_string(),
            ));
        }
        let state = self.state.read().await;
        let matched: Vec<AuditRecord> = state
            .log
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
        let state = self.state.read().await;
        let matched: Vec<AuditRecord> = state
            .log
            .iter()
            .filter(|r| r.entity_name == entity_name)
            .cloned()
            .collect();
        let mut ordered = order_history(matched);
        ordered.truncate(limit);
        Ok(ordered)
    }

    async fn count(&self) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.log.len() as u64)
    }
}

/// A transactional scope over the memory engine
///
/// Tracks inserts, updates, and removals, then applies them atomically on
/// `commit`. Each unit of work diffs against its own snapshot of the
/// committed state, taken when tracking begins.
pub struct MemoryUnitOfWork {
    registry: Arc<DescriberRegistry>,
    pipeline: HookPipeline,
    state: Arc<RwLock<EngineState>>,
    tracked: Vec<ContextEntry>,
}

impl MemoryUnitOfWork {
    /// Track a new entity; its identity is assigned at commit
    pub fn insert<T>(&mut self, entity: T)
    where
        T: AuditEntity + Serialize,
    {
        let name = table_name::<T>(&self.registry);
        self.tracked.push(ContextEntry::new(
            name,
            EntityState::Added,
            None,
            None,
            Box::new(entity),
            row_of::<T>,
        ));
    }

    /// Track a modification of the stored entity at `key`
    ///
    /// The pre-change state is reconstructed from the committed row at call
    /// time, so the eventual diff reflects this transaction's view.
    pub async fn update<T>(&mut self, key: &str, entity: T) -> Result<()>
    where
        T: AuditEntity + Serialize + DeserializeOwned,
    {
        let name = table_name::<T>(&self.registry);
        let original: T = self.stored(&name, key).await?;
        let original_description = self.registry.describe(&original).ok();

        self.tracked.push(ContextEntry::new(
            name,
            EntityState::Modified,
            Some(key.to_string()),
            original_description,
            Box::new(entity),
            row_of::<T>,
        ));
        Ok(())
    }

    /// Track removal of the stored entity at `key`
    pub async fn remove<T>(&mut self, key: &str) -> Result<()>
    where
        T: AuditEntity + Serialize + DeserializeOwned,
    {
        let name = table_name::<T>(&self.registry);
        let original: T = self.stored(&name, key).await?;
        let original_description = self.registry.describe(&original).ok();

        self.tracked.push(ContextEntry::new(
            name,
            EntityState::Removed,
            Some(key.to_string()),
            original_description,
            Box::new(original),
            row_of::<T>,
        ));
        Ok(())
    }

    /// Number of tracked entities
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Discard everything tracked by this unit of work
    ///
    /// Dropping without committing has the same effect.
    pub fn rollback(self) {}

    /// Run the pre-commit pipeline and apply all tracked mutations
    /// atomically, together with the audit records they produced
    ///
    /// Any hook or serialization error aborts the whole commit with no
    /// partial state — the business mutation never lands without its trail.
    pub async fn commit(self) -> Result<CommitSummary> {
        let MemoryUnitOfWork {
            registry: _,
            pipeline,
            state,
            tracked,
        } = self;

        if tracked.is_empty() {
            return Ok(CommitSummary::default());
        }

        let mut ctx = CommitContext::new(tracked);
        pipeline.before_write(&mut ctx)?;

        let mut guard = state.write().await;

        // Candidate identity assignment; sequences advance only on success
        let mut counters: HashMap<String, u64> = HashMap::new();
        let mut assigned_keys = Vec::new();
        for index in 0..ctx.entries().len() {
            let (added, name) = {
                let entry = &ctx.entries()[index];
                (entry.state == EntityState::Added, entry.name.clone())
            };
            if !added {
                continue;
            }
            let next = counters
                .entry(name.clone())
                .or_insert_with(|| guard.next_id(&name));
            let key = next.to_string();
            *next += 1;
            ctx.assign_key(index, key.clone());
            assigned_keys.push(key);
        }

        pipeline.after_identity(&mut ctx)?;

        // Serialize every row before touching the tables, so a failure
        // cannot leave a partial apply behind
        enum Op {
            Upsert(serde_json::Value),
            Delete,
        }
        let mut ops: Vec<(String, String, Op)> = Vec::new();
        for index in 0..ctx.entries().len() {
            let (state, name) = {
                let entry = &ctx.entries()[index];
                (entry.state, entry.name.clone())
            };
            let key = match state {
                EntityState::Added => ctx
                    .assigned_key(index)
                    .map(str::to_string)
                    .ok_or_else(|| AuditError::KeyExtraction {
                        entity: name.clone(),
                        reason: "no identity assigned at apply time".to_string(),
                    })?,
                _ => ctx.entries()[index].key.clone().ok_or_else(|| {
                    AuditError::HostEnumeration(format!(
                        "tracked '{}' entry has no primary key",
                        name
                    ))
                })?,
            };
            let op = match state {
                EntityState::Removed => Op::Delete,
                _ => {
                    // The stored row's own id field must agree with the key
                    // it is stored under
                    let entry = &mut ctx.entries_mut()[index];
                    entry.entity_mut().adopt_key(&key);
                    Op::Upsert(entry.row()?)
                }
            };
            ops.push((name, key, op));
        }

        let records = ctx.take_records();
        let summary = CommitSummary {
            applied: ops.len(),
            audit_records: records.len(),
            assigned_keys,
        };

        for (table, key, op) in ops {
            match op {
                Op::Upsert(row) => {
                    guard.tables.entry(table).or_default().insert(key, row);
                }
                Op::Delete => {
                    if let Some(rows) = guard.tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }
        for (name, next) in counters {
            guard.next_ids.insert(name, next);
        }
        guard.log.extend(records);

        tracing::info!(
            applied = summary.applied,
            audit_records = summary.audit_records,
            "Unit of work committed"
        );
        Ok(summary)
    }

    async fn stored<T: DeserializeOwned>(&self, name: &str, key: &str) -> Result<T> {
        let state = self.state.read().await;
        let row = state
            .tables
            .get(name)
            .and_then(|t| t.get(key))
            .cloned()
            .ok_or_else(|| AuditError::NotFound(format!("{} '{}'", name, key)))?;
        drop(state);
        Ok(serde_json::from_value(row)?)
    }
}

fn table_name<T: 'static>(registry: &DescriberRegistry) -> String {
    registry
        .name_of::<T>()
        .map(str::to_string)
        .unwrap_or_else(|| short_type_name(std::any::type_name::<T>()))
}

fn row_of<T: Serialize + 'static>(any: &dyn Any) -> Result<serde_json::Value> {
    let entity = any.downcast_ref::<T>().ok_or_else(|| {
        AuditError::HostEnumeration("tracked entity type does not match its row shape".to_string())
    })?;
    Ok(serde_json::to_value(entity)?)
}
