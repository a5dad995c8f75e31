//! Core audit types
//!
//! All persisted types use camelCase JSON serialization for wire
//! compatibility.

use crate::value::CodecValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mutation classification for one audit record
///
/// Serialized as its variant name (`"Create"`, `"Update"`, `"Delete"`) so
/// stored history stays readable without a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for TrailAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrailAction::Create => "Create",
            TrailAction::Update => "Update",
            TrailAction::Delete => "Delete",
        };
        write!(f, "{}", name)
    }
}

/// Pending state of a tracked entity inside one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Created in this transaction, identity not yet assigned
    Added,
    /// Exists in the store, with pending field changes
    Modified,
    /// Marked for deletion in this transaction
    Removed,
}

impl EntityState {
    /// The audit action this state classifies as
    pub fn action(&self) -> TrailAction {
        match self {
            EntityState::Added => TrailAction::Create,
            EntityState::Modified => TrailAction::Update,
            EntityState::Removed => TrailAction::Delete,
        }
    }
}

/// Ordered snapshot of raw field values, in describer declaration order
///
/// Raw values are host-shaped `serde_json::Value`s; encoding into
/// `CodecValue` happens in the diff engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSnapshot {
    fields: Vec<(String, serde_json::Value)>,
}

impl FieldSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, replacing any existing value under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for FieldSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        let mut snapshot = FieldSnapshot::new();
        for (name, value) in iter {
            snapshot.insert(name, value);
        }
        snapshot
    }
}

/// One immutable entry in the audit log
///
/// Constructed entirely within a single capture pass, queued into the same
/// transaction as the mutation it describes, and durable exactly when that
/// transaction commits. Never mutated or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Unique record identifier (trail-<uuid>)
    pub id: String,

    /// Stable string identifying the audited entity type
    pub entity_name: String,

    /// String form of the entity's identity
    ///
    /// For creates this is filled from the store-assigned key after the
    /// physical insert, still inside the same transaction.
    pub primary_key: String,

    /// Identity of the operation's originator ("system" when anonymous)
    pub actor_id: String,

    /// Commit-time clock reading — one read per capture pass
    pub timestamp_utc: DateTime<Utc>,

    /// Mutation classification
    pub action: TrailAction,

    /// Pre-change values; empty for Create
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub old_values: BTreeMap<String, CodecValue>,

    /// Post-change values; empty for Delete
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub new_values: BTreeMap<String, CodecValue>,

    /// Field names that differ, in describer order; empty for Create/Delete
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
}

impl AuditRecord {
    /// Create a record with a fresh id
    pub fn new(
        entity_name: impl Into<String>,
        primary_key: impl Into<String>,
        actor_id: impl Into<String>,
        timestamp_utc: DateTime<Utc>,
        action: TrailAction,
    ) -> Self {
        Self {
            id: format!("trail-{}", uuid::Uuid::new_v4()),
            entity_name: entity_name.into(),
            primary_key: primary_key.into(),
            actor_id: actor_id.into(),
            timestamp_utc,
            action,
            old_values: BTreeMap::new(),
            new_values: BTreeMap::new(),
            changed_fields: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_creation() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let record = AuditRecord::new("Product", "7", "alice", ts, TrailAction::Create);

        assert!(record.id.starts_with("trail-"));
        assert_eq!(record.entity_name, "Product");
        assert_eq!(record.primary_key, "7");
        assert_eq!(record.actor_id, "alice");
        assert_eq!(record.action, TrailAction::Create);
        assert!(record.old_values.is_empty());
        assert!(record.new_values.is_empty());
        assert!(record.changed_fields.is_empty());
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let mut record = AuditRecord::new("Product", "7", "alice", ts, TrailAction::Update);
        record
            .old_values
            .insert("UnitPrice".to_string(), CodecValue::Decimal(10.0));
        record
            .new_values
            .insert("UnitPrice".to_string(), CodecValue::Decimal(12.5));
        record.changed_fields.push("UnitPrice".to_string());

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"entityName\":\"Product\""));
        assert!(json.contains("\"primaryKey\":\"7\""));
        assert!(json.contains("\"action\":\"Update\""));
        assert!(json.contains("\"changedFields\":[\"UnitPrice\"]"));

        let parsed: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.old_values["UnitPrice"], CodecValue::Decimal(10.0));
        assert_eq!(parsed.new_values["UnitPrice"], CodecValue::Decimal(12.5));
    }

    #[test]
    fn test_empty_maps_skipped_in_json() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let record = AuditRecord::new("Product", "7", "system", ts, TrailAction::Create);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("oldValues"));
        assert!(!json.contains("newValues"));
        assert!(!json.contains("changedFields"));
    }

    #[test]
    fn test_trail_action_display() {
        assert_eq!(TrailAction::Create.to_string(), "Create");
        assert_eq!(TrailAction::Update.to_string(), "Update");
        assert_eq!(TrailAction::Delete.to_string(), "Delete");
    }

    #[test]
    fn test_entity_state_action_mapping() {
        assert_eq!(EntityState::Added.action(), TrailAction::Create);
        assert_eq!(EntityState::Modified.action(), TrailAction::Update);
        assert_eq!(EntityState::Removed.action(), TrailAction::Delete);
    }

    #[test]
    fn test_field_snapshot_preserves_order() {
        let mut snapshot = FieldSnapshot::new();
        snapshot.insert("Name", serde_json::json!("Widget"));
        snapshot.insert("UnitsInStock", serde_json::json!(10));
        snapshot.insert("UnitPrice", serde_json::json!(12.5));

        let names: Vec<&str> = snapshot.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Name", "UnitsInStock", "UnitPrice"]);
    }

    #[test]
    fn test_field_snapshot_insert_replaces() {
        let mut snapshot = FieldSnapshot::new();
        snapshot.insert("Name", serde_json::json!("Widget"));
        snapshot.insert("Name", serde_json::json!("Gadget"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("Name"), Some(&serde_json::json!("Gadget")));
    }
}
