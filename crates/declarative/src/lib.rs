//! # Declarative
//!
//! A framework for reconciling declared resources against a remote system.
//!
//! The host declares desired state as [`ResourceSpec`]s, keeps the records
//! it last saw as [`Snapshots`], and converges the remote through a
//! [`RemoteClient`].
//!
//! ## Core Concepts
//!
//! - **KindSchema**: Static field table for one resource kind
//! - **ResourceSpec**: Validated desired configuration for one resource
//! - **RemoteRecord**: Last-observed remote state, with a version token
//! - **ExecutionPlan**: Operations in dependency order
//! - **Executor**: Applies a plan with retries, skips, and re-planning
//!
//! ## Example
//!
//! ```
//! use declarative::schema::{FieldDef, FieldType, KindSchema, no_references, no_rule};
//! use declarative::{
//!     AttrValue, Attributes, Catalog, MemoryClient, ResourceSpec, Snapshots, execute_simple, plan,
//! };
//!
//! static FIELDS: &[FieldDef] = &[FieldDef::mutable("stages", FieldType::List).required()];
//! static TEMPLATE: KindSchema = KindSchema {
//!     kind: "pipeline_template",
//!     fields: FIELDS,
//!     references: no_references,
//!     rule: no_rule,
//! };
//!
//! let catalog = Catalog::new(vec![&TEMPLATE]);
//! let mut attributes = Attributes::new();
//! attributes.insert("stages".into(), AttrValue::List(vec![]));
//! let spec = ResourceSpec::new(&TEMPLATE, "template1", attributes, []).unwrap();
//!
//! let client = MemoryClient::new();
//! let plan = plan(&catalog, &[spec], &Snapshots::new()).unwrap();
//! let report = execute_simple(&plan, &client, &catalog, &Snapshots::new());
//! assert_eq!(report.summary.created, 1);
//! ```
//!
//! ## Host Traits
//!
//! - [`RemoteClient`]: Talks to the remote system
//! - [`ProgressCallback`]: Receives progress updates
//!
//! This allows the crate to be used without hard dependencies on a
//! particular transport or terminal UI.

pub mod client;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
mod graph;
pub mod import;
pub mod memory;
pub mod planner;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod types;
pub mod verify;

// Re-export main types at crate root
pub use client::RemoteClient;
pub use context::{CancellationToken, ExecuteOptions, NoProgress, ProgressCallback};
pub use diff::{DiffSummary, FieldChange, ResourceDiff, changed_fields, plan_resource};
pub use error::{Error, ErrorCategory, Residue, Result};
pub use executor::{ExecutionReport, StepOutcome, execute, execute_simple};
pub use import::{ImportedResource, resolve, resolve_all};
pub use memory::MemoryClient;
pub use planner::{ExecutionPlan, PlannedStep, plan, plan_destroy, refresh};
pub use resource::ResourceSpec;
pub use retry::RetryConfig;
pub use schema::{Catalog, FieldDef, FieldDefault, FieldType, KindSchema, Mutability};
pub use types::{
    Action, AttrValue, Attributes, Change, ExecuteSummary, ExecutionResult, Operation,
    RemoteRecord, ResourceKey, Snapshots,
};
pub use verify::{verify_all, verify_destroyed};
