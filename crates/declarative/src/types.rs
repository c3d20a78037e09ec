//! Core types for declarative resource reconciliation

use crate::error::Error;
use crate::resource::ResourceSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed attribute value.
///
/// Untagged so the same value reads from TOML config, JSON wire bodies, and
/// TOML state files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<AttrValue>),
    Map(IndexMap<String, AttrValue>),
}

impl AttrValue {
    /// Name of the value's type, as used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, AttrValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is a map
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Render for string comparison: strings unquoted, scalars plain,
    /// collections as compact JSON, null as empty.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::String(s) => s.clone(),
            Self::List(_) | Self::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Null => write!(f, "null"),
            other => write!(f, "{}", other.render()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(value: Vec<AttrValue>) -> Self {
        Self::List(value)
    }
}

impl From<IndexMap<String, AttrValue>> for AttrValue {
    fn from(value: IndexMap<String, AttrValue>) -> Self {
        Self::Map(value)
    }
}

/// Ordered mapping of field name to value
pub type Attributes = IndexMap<String, AttrValue>;

/// Identity of a resource within a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse an address of the form `kind.name`.
    ///
    /// The kind is everything before the first dot, so names may contain dots.
    pub fn parse(address: &str) -> Option<Self> {
        let (kind, name) = address.split_once('.')?;
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(kind, name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// Last-observed state of a resource as reported by the remote system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub kind: String,
    pub id: String,
    /// Opaque concurrency token; the remote rejects writes carrying a stale one
    pub version: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl RemoteRecord {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.id)
    }
}

/// Prior records the host persists between passes, in creation order
pub type Snapshots = IndexMap<ResourceKey, RemoteRecord>;

/// Kind of action an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
}

impl Action {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        f.write_str(s)
    }
}

/// One planned action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create(ResourceSpec),
    Update {
        spec: ResourceSpec,
        record: RemoteRecord,
        version: String,
    },
    Delete {
        record: RemoteRecord,
        version: String,
    },
    NoOp {
        spec: ResourceSpec,
        record: RemoteRecord,
    },
}

impl Operation {
    pub fn action(&self) -> Action {
        match self {
            Self::Create(_) => Action::Create,
            Self::Update { .. } => Action::Update,
            Self::Delete { .. } => Action::Delete,
            Self::NoOp { .. } => Action::NoOp,
        }
    }

    pub fn key(&self) -> ResourceKey {
        match self {
            Self::Create(spec) | Self::Update { spec, .. } | Self::NoOp { spec, .. } => {
                spec.key().clone()
            }
            Self::Delete { record, .. } => record.key(),
        }
    }

    /// The desired spec, absent for deletes
    pub fn spec(&self) -> Option<&ResourceSpec> {
        match self {
            Self::Create(spec) | Self::Update { spec, .. } | Self::NoOp { spec, .. } => Some(spec),
            Self::Delete { .. } => None,
        }
    }
}

/// What a successfully applied operation changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    NoChange,
    Created,
    Updated,
    Deleted,
}

/// Outcome of applying one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Operation took effect; `record` is absent after a delete
    Applied {
        change: Change,
        record: Option<RemoteRecord>,
    },
    /// Operation failed after local retries
    Failed { error: Error, retriable: bool },
    /// Operation was not attempted
    Skipped { reason: String },
}

impl ExecutionResult {
    pub fn applied(change: Change, record: Option<RemoteRecord>) -> Self {
        Self::Applied { change, record }
    }

    pub fn failed(error: Error) -> Self {
        let retriable = error.is_retryable();
        Self::Failed { error, retriable }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Check if the result represents success (no failure, not skipped)
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Check if the result represents a change to the remote system
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Applied {
                change: Change::Created | Change::Updated | Change::Deleted,
                ..
            }
        )
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if execution was fully successful (nothing failed or skipped)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Total number of operations processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.unchanged + self.skipped + self.failed
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ExecutionResult) {
        match result {
            ExecutionResult::Applied { change, .. } => match change {
                Change::NoChange => self.unchanged += 1,
                Change::Created => self.created += 1,
                Change::Updated => self.updated += 1,
                Change::Deleted => self.deleted += 1,
            },
            ExecutionResult::Failed { .. } => self.failed += 1,
            ExecutionResult::Skipped { .. } => self.skipped += 1,
        }
    }
}
