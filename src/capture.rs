//! Audit capture hook — diff dirty entities and queue their records
//!
//! Runs inline on whichever task is committing the unit of work, in two
//! sub-phases: describe/diff before the physical write, key-fill after the
//! store assigns identities. Produced records are queued into the same
//! transaction and become durable exactly when it commits.

use crate::describe::DescriberRegistry;
use crate::diff::diff;
use crate::error::{AuditError, Result};
use crate::hooks::{CommitContext, PreCommitHook};
use crate::types::{AuditRecord, EntityState, TrailAction};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Commit-time clock collaborator
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at the given instant
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    /// Move the clock to a new instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    /// Advance the clock by a duration
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// Lookup for the identity behind the current operation
pub trait CurrentActor: Send + Sync {
    /// Actor id, or `None` when no authenticated actor is available
    fn id(&self) -> Option<String>;
}

/// No authenticated actor — records fall back to the configured sentinel
#[derive(Default)]
pub struct SystemActor;

impl CurrentActor for SystemActor {
    fn id(&self) -> Option<String> {
        None
    }
}

/// Fixed actor id, for embedding and tests
pub struct StaticActor(pub String);

impl CurrentActor for StaticActor {
    fn id(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Capture settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Actor id recorded when no authenticated actor is available
    pub fallback_actor: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fallback_actor: "system".to_string(),
        }
    }
}

/// The audit capture pre-commit hook
///
/// For every dirty, registered entity that opts in, builds one audit record
/// via the diff engine. Update diffs with zero changed fields produce no
/// record. Create records are deferred until identity assignment so the
/// primary key is never a temporary placeholder.
pub struct AuditCaptureHook {
    registry: Arc<DescriberRegistry>,
    actor: Arc<dyn CurrentActor>,
    clock: Arc<dyn Clock>,
    config: CaptureConfig,
}

impl AuditCaptureHook {
    /// Create a capture hook with default settings
    pub fn new(
        registry: Arc<DescriberRegistry>,
        actor: Arc<dyn CurrentActor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(registry, actor, clock, CaptureConfig::default())
    }

    /// Create a capture hook with explicit settings
    pub fn with_config(
        registry: Arc<DescriberRegistry>,
        actor: Arc<dyn CurrentActor>,
        clock: Arc<dyn Clock>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            registry,
            actor,
            clock,
            config,
        }
    }

    fn build_record(
        &self,
        ctx: &CommitContext,
        index: usize,
        actor_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<AuditRecord>> {
        let entry = &ctx.entries()[index];

        if !entry.entity().audit_enabled() {
            tracing::debug!(entity = %entry.name, "Entity opted out of audit capture");
            return Ok(None);
        }

        let action = entry.state.action();

        let after = match entry.state {
            EntityState::Removed => None,
            _ => match self.registry.describe(entry.entity()) {
                Ok(description) => Some(description),
                Err(AuditError::UnregisteredEntity(name)) => {
                    tracing::debug!(entity = %name, "Unregistered entity type, not audited");
                    return Ok(None);
                }
                Err(other) => return Err(other),
            },
        };

        // Removed entities are described from the host-captured original;
        // an absent original means the type was unregistered at tracking time.
        if action == TrailAction::Delete && entry.original.is_none() {
            tracing::debug!(entity = %entry.name, "No pre-commit state, not audited");
            return Ok(None);
        }

        let change_set = diff(action, entry.original.as_ref(), after.as_ref())?;
        if action == TrailAction::Update && change_set.changed_fields.is_empty() {
            // No-op save, no record
            return Ok(None);
        }

        let primary_key = match action {
            // Deferred: filled after the store assigns the identity
            TrailAction::Create => String::new(),
            _ => self.resolve_key(entry, after.as_ref())?,
        };

        let mut record = AuditRecord::new(
            entry.name.clone(),
            primary_key,
            actor_id,
            timestamp,
            action,
        );
        record.old_values = change_set.old_values;
        record.new_values = change_set.new_values;
        record.changed_fields = change_set.changed_fields;
        Ok(Some(record))
    }

    fn resolve_key(
        &self,
        entry: &crate::hooks::ContextEntry,
        after: Option<&crate::describe::EntityDescription>,
    ) -> Result<String> {
        if let Some(key) = &entry.key {
            return Ok(key.clone());
        }
        let described = after
            .and_then(|d| d.primary_key.clone())
            .or_else(|| entry.original.as_ref().and_then(|d| d.primary_key.clone()));
        described.ok_or_else(|| AuditError::KeyExtraction {
            entity: entry.name.clone(),
            reason: "no host key and no primary-key field value".to_string(),
        })
    }
}

impl PreCommitHook for AuditCaptureHook {
    fn name(&self) -> &'static str {
        "audit-capture"
    }

    fn before_write(&self, ctx: &mut CommitContext) -> Result<()> {
        // One clock and actor read per capture pass
        let timestamp = self.clock.now_utc();
        let actor_id = self
            .actor
            .id()
            .unwrap_or_else(|| self.config.fallback_actor.clone());

        let mut produced: Vec<(usize, AuditRecord)> = Vec::new();
        for index in 0..ctx.entries().len() {
            if let Some(record) = self.build_record(ctx, index, &actor_id, timestamp)? {
                produced.push((index, record));
            }
        }

        for (index, record) in produced {
            if record.action == TrailAction::Create {
                ctx.defer_record(index, record);
            } else {
                ctx.queue_record(record);
            }
        }
        Ok(())
    }

    fn after_identity(&self, ctx: &mut CommitContext) -> Result<()> {
        for (index, mut record) in ctx.take_deferred() {
            match ctx.assigned_key(index) {
                Some(key) => {
                    record.primary_key = key.to_string();
                    ctx.queue_record(record);
                }
                None => {
                    return Err(AuditError::KeyExtraction {
                        entity: record.entity_name,
                        reason: "store assigned no identity for inserted entity".to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}
