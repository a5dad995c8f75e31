//! Diff engine — classify field-level differences between entity states
//!
//! Takes the before/after descriptions of one tracked entity and produces a
//! `ChangeSet`. Comparison happens on codec-encoded values, so numeric
//! formatting differences never register as changes. Pure CPU-bound code,
//! no I/O, no suspension points.

use crate::describe::EntityDescription;
use crate::error::{AuditError, Result};
use crate::types::TrailAction;
use crate::value::CodecValue;
use std::collections::BTreeMap;

/// Classified outcome of diffing one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Pre-change values; full snapshot for Delete, changed fields for Update
    pub old_values: BTreeMap<String, CodecValue>,
    /// Post-change values; full snapshot for Create, changed fields for Update
    pub new_values: BTreeMap<String, CodecValue>,
    /// Differing field names in describer order; empty for Create/Delete
    pub changed_fields: Vec<String>,
}

impl ChangeSet {
    /// True when an Update produced no field or navigation changes
    pub fn is_empty(&self) -> bool {
        self.changed_fields.is_empty() && self.old_values.is_empty() && self.new_values.is_empty()
    }
}

/// Compute the change set for one tracked entity
///
/// - `Create`: `before` is ignored; every `after` field lands in
///   `new_values`, `changed_fields` stays empty.
/// - `Delete`: every `before` field lands in `old_values`.
/// - `Update`: fields whose codec-encoded values differ enter all three
///   collections; unchanged fields are omitted entirely. A field absent on
///   one side encodes as `Null`. Changed navigations add a marker entry
///   (the related type's name) to `changed_fields` only.
pub fn diff(
    action: TrailAction,
    before: Option<&EntityDescription>,
    after: Option<&EntityDescription>,
) -> Result<ChangeSet> {
    match action {
        TrailAction::Create => {
            let after = after.ok_or_else(|| {
                AuditError::Config("Create diff requires a post-commit state".to_string())
            })?;
            let mut change_set = ChangeSet::default();
            for (name, raw) in after.fields.iter() {
                change_set
                    .new_values
                    .insert(name.to_string(), CodecValue::encode(raw));
            }
            Ok(change_set)
        }
        TrailAction::Delete => {
            let before = before.ok_or_else(|| {
                AuditError::Config("Delete diff requires a pre-commit state".to_string())
            })?;
            let mut change_set = ChangeSet::default();
            for (name, raw) in before.fields.iter() {
                change_set
                    .old_values
                    .insert(name.to_string(), CodecValue::encode(raw));
            }
            Ok(change_set)
        }
        TrailAction::Update => {
            let after = after.ok_or_else(|| {
                AuditError::Config("Update diff requires a post-commit state".to_string())
            })?;
            Ok(diff_update(before, after))
        }
    }
}

fn diff_update(before: Option<&EntityDescription>, after: &EntityDescription) -> ChangeSet {
    let mut change_set = ChangeSet::default();

    // After-side order first, then any field only the before-state knew
    let mut names: Vec<&str> = after.fields.iter().map(|(n, _)| n).collect();
    if let Some(before) = before {
        for (name, _) in before.fields.iter() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    for name in names {
        let old = before
            .and_then(|b| b.fields.get(name))
            .map(CodecValue::encode)
            .unwrap_or(CodecValue::Null);
        let new = after
            .fields
            .get(name)
            .map(CodecValue::encode)
            .unwrap_or(CodecValue::Null);

        if old != new {
            change_set.old_values.insert(name.to_string(), old);
            change_set.new_values.insert(name.to_string(), new);
            change_set.changed_fields.push(name.to_string());
        }
    }

    // Shallow navigation capture: a changed collection contributes one
    // marker named after the related type, with no old/new values.
    for nav in &after.navigations {
        let before_value = before.and_then(|b| {
            b.navigations
                .iter()
                .find(|n| n.related == nav.related)
                .map(|n| &n.value)
        });
        let changed = match before_value {
            Some(previous) => *previous != nav.value,
            None => true,
        };
        if changed && !change_set.changed_fields.iter().any(|f| f == &nav.related) {
            change_set.changed_fields.push(nav.related.clone());
        }
    }

    change_set
}
