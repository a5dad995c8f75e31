//! History query layer — render stored records for display
//!
//! A pure read over the append-only log: ordered history for one entity
//! identity, rendered into the external DTO shape. Updates carry per-field
//! changes; creates and deletes carry a full snapshot blob instead.

use crate::error::Result;
use crate::store::AuditStore;
use crate::types::{AuditRecord, TrailAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One rendered field change of an update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetail {
    /// Field name
    pub property: String,
    /// Pre-change value; `None` when the field was unset
    pub old_value: Option<String>,
    /// Post-change value; `None` when the field became unset
    pub new_value: Option<String>,
}

/// Externally rendered form of one audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Audit record id
    pub trail_id: String,
    /// Action name ("Create", "Update", "Delete")
    pub action: String,
    /// Actor who performed the mutation
    pub user_id: String,
    /// Commit-time timestamp
    pub date_utc: DateTime<Utc>,
    /// Audited entity type
    pub entity_name: String,
    /// Entity identity
    pub primary_key: String,
    /// Per-field changes; populated only for updates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeDetail>,
    /// Encoded snapshot of new (Create) or old (Delete) values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_snapshot: Option<String>,
}

/// Read-side facade over any `AuditStore`
pub struct AuditHistory {
    store: Arc<dyn AuditStore>,
}

impl AuditHistory {
    /// Create a history reader over a store
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Ordered, rendered history for one entity identity
    ///
    /// Newest first; ties preserve commit order. Idempotent, never mutates
    /// the log.
    pub async fn entity_history(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<HistoryEntry>> {
        let records = self.store.history(entity_name, entity_id).await?;
        records.iter().map(render).collect()
    }

    /// Ordered, rendered history across one entity type
    pub async fn type_history(&self, entity_name: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let records = self.store.history_for_type(entity_name, limit).await?;
        records.iter().map(render).collect()
    }
}

fn render(record: &AuditRecord) -> Result<HistoryEntry> {
    let mut entry = HistoryEntry {
        trail_id: record.id.clone(),
        action: record.action.to_string(),
        user_id: record.actor_id.clone(),
        date_utc: record.timestamp_utc,
        entity_name: record.entity_name.clone(),
        primary_key: record.primary_key.clone(),
        changes: Vec::new(),
        full_snapshot: None,
    };

    match record.action {
        TrailAction::Create => {
            entry.full_snapshot = Some(serde_json::to_string(&record.new_values)?);
        }
        TrailAction::Delete => {
            entry.full_snapshot = Some(serde_json::to_string(&record.old_values)?);
        }
        TrailAction::Update => {
            for field in &record.changed_fields {
                // Navigation markers have no stored values and render as
                // a property with both sides absent
                entry.changes.push(ChangeDetail {
                    property: field.clone(),
                    old_value: record.old_values.get(field).and_then(|v| v.decode()),
                    new_value: record.new_values.get(field).and_then(|v| v.decode()),
                });
            }
        }
    }

    Ok(entry)
}
