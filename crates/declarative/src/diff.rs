//! State Differ
//!
//! Compares one spec against its last-known remote record and yields the
//! single operation that converges them.

use crate::error::{Error, Result};
use crate::resource::ResourceSpec;
use crate::schema::KindSchema;
use crate::types::{Action, AttrValue, Attributes, Operation, RemoteRecord, ResourceKey};
use serde::Serialize;

/// One field whose effective value differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub before: AttrValue,
    pub after: AttrValue,
    pub immutable: bool,
}

/// Fields whose effective values differ between desired and actual.
///
/// Only fields declared by the schema are compared; a missing field and a
/// null field both compare as the field's default, after the field's
/// normalizer (if any) has run on both sides.
pub fn changed_fields(
    schema: &KindSchema,
    desired: &Attributes,
    actual: &Attributes,
) -> Vec<FieldChange> {
    schema
        .fields
        .iter()
        .filter_map(|field| {
            let after = field.comparable(desired);
            let before = field.comparable(actual);
            (before != after).then(|| FieldChange {
                field: field.name.to_string(),
                before,
                after,
                immutable: field.is_immutable(),
            })
        })
        .collect()
}

/// Plan the operation for one resource.
///
/// No record means `Create`; equal effective attributes mean `NoOp`;
/// anything else is an `Update` carrying the record's version. A change to
/// an immutable field fails with `ImmutableFieldChanged` before anything is
/// sent to the remote.
pub fn plan_resource(
    schema: &KindSchema,
    spec: &ResourceSpec,
    record: Option<&RemoteRecord>,
) -> Result<Operation> {
    let Some(record) = record else {
        return Ok(Operation::Create(spec.clone()));
    };

    let changes = changed_fields(schema, spec.attributes(), &record.attributes);
    if changes.is_empty() {
        return Ok(Operation::NoOp {
            spec: spec.clone(),
            record: record.clone(),
        });
    }

    let immutable: Vec<String> = changes
        .iter()
        .filter(|c| c.immutable)
        .map(|c| c.field.clone())
        .collect();
    if !immutable.is_empty() {
        return Err(Error::ImmutableFieldChanged {
            kind: spec.kind().to_string(),
            id: spec.name().to_string(),
            fields: immutable,
        });
    }

    Ok(Operation::Update {
        spec: spec.clone(),
        record: record.clone(),
        version: record.version.clone(),
    })
}

/// A diff between desired and actual state of one resource, for display
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDiff {
    pub key: ResourceKey,
    pub action: Action,
    /// Field-level changes; empty for creates and deletes
    pub changes: Vec<FieldChange>,
}

impl ResourceDiff {
    /// Describe an operation, returning None for no-ops
    pub fn from_operation(schema: Option<&KindSchema>, op: &Operation) -> Option<Self> {
        let changes = match (schema, op) {
            (_, Operation::NoOp { .. }) => return None,
            (Some(schema), Operation::Update { spec, record, .. }) => {
                changed_fields(schema, spec.attributes(), &record.attributes)
            }
            _ => Vec::new(),
        };
        Some(Self {
            key: op.key(),
            action: op.action(),
            changes,
        })
    }

    pub fn is_addition(&self) -> bool {
        self.action == Action::Create
    }

    pub fn is_removal(&self) -> bool {
        self.action == Action::Delete
    }

    pub fn is_modification(&self) -> bool {
        self.action == Action::Update
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to delete
    pub removals: usize,
    /// Number of resources to update
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else if diff.is_modification() {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::WIDGET;

    fn spec(pairs: &[(&str, AttrValue)]) -> ResourceSpec {
        let attributes = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        ResourceSpec::new(&WIDGET, "w1", attributes, []).unwrap()
    }

    fn record_of(spec: &ResourceSpec) -> RemoteRecord {
        RemoteRecord {
            kind: spec.kind().to_string(),
            id: spec.name().to_string(),
            attributes: spec.attributes().clone(),
            version: "v7".to_string(),
        }
    }

    #[test]
    fn test_no_record_is_create() {
        let s = spec(&[("color", "red".into())]);
        let op = plan_resource(&WIDGET, &s, None).unwrap();
        assert_eq!(op, Operation::Create(s));
    }

    #[test]
    fn test_identical_is_noop() {
        let s = spec(&[("color", "red".into())]);
        let op = plan_resource(&WIDGET, &s, Some(&record_of(&s))).unwrap();
        assert_eq!(op.action(), Action::NoOp);
    }

    #[test]
    fn test_missing_vs_default_is_noop() {
        let s = spec(&[("color", "red".into())]);
        let mut record = record_of(&s);
        record.attributes.insert("size".into(), AttrValue::Int(1));
        record.attributes.insert("tags".into(), AttrValue::List(vec![]));
        record.attributes.insert("parent".into(), AttrValue::Null);
        // undeclared remote fields are ignored
        record
            .attributes
            .insert("_links".into(), AttrValue::from("http://x"));

        let op = plan_resource(&WIDGET, &s, Some(&record)).unwrap();
        assert_eq!(op.action(), Action::NoOp);
    }

    #[test]
    fn test_change_is_update_with_version() {
        let s = spec(&[("color", "red".into())]);
        let mut record = record_of(&s);
        record.attributes.insert("color".into(), "blue".into());

        match plan_resource(&WIDGET, &s, Some(&record)).unwrap() {
            Operation::Update { version, .. } => assert_eq!(version, "v7"),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_immutable_change_fails_fast() {
        let s = spec(&[("color", "red".into()), ("serial", "A".into())]);
        let mut record = record_of(&s);
        record.attributes.insert("serial".into(), "B".into());
        record.attributes.insert("color".into(), "blue".into());

        let err = plan_resource(&WIDGET, &s, Some(&record)).unwrap_err();
        assert_eq!(
            err,
            Error::ImmutableFieldChanged {
                kind: "widget".into(),
                id: "w1".into(),
                fields: vec!["serial".into()],
            }
        );
    }

    #[test]
    fn test_resource_diff_lists_changes() {
        let s = spec(&[("color", "red".into()), ("size", AttrValue::Int(3))]);
        let mut record = record_of(&s);
        record.attributes.insert("size".into(), AttrValue::Int(2));
        let op = plan_resource(&WIDGET, &s, Some(&record)).unwrap();

        let diff = ResourceDiff::from_operation(Some(&WIDGET), &op).unwrap();
        assert!(diff.is_modification());
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].field, "size");
        assert_eq!(diff.changes[0].before, AttrValue::Int(2));

        let noop = plan_resource(&WIDGET, &s, Some(&record_of(&s))).unwrap();
        assert!(ResourceDiff::from_operation(Some(&WIDGET), &noop).is_none());
    }

    #[test]
    fn test_diff_summary() {
        let s = spec(&[("color", "red".into())]);
        let create = ResourceDiff::from_operation(None, &Operation::Create(s.clone())).unwrap();
        let delete = ResourceDiff::from_operation(
            None,
            &Operation::Delete {
                record: record_of(&s),
                version: "v7".into(),
            },
        )
        .unwrap();
        let summary = DiffSummary::from_diffs(&[create, delete]);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.removals, 1);
        assert!(summary.has_changes());
    }
}
