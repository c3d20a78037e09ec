//! Lifecycle executor - applies a plan through a remote client
//!
//! Steps run one at a time in plan order. A failed or skipped step blocks
//! everything that depends on it, while independent steps keep going.
//! Transient errors are retried with backoff; a stale version token leads
//! to one re-fetch and re-plan of that resource before giving up.

use crate::client::RemoteClient;
use crate::context::{CancellationToken, ExecuteOptions, NoProgress, ProgressCallback};
use crate::diff;
use crate::error::{Error, Result};
use crate::planner::{ExecutionPlan, PlannedStep};
use crate::resource::ResourceSpec;
use crate::retry::{LogCallback, RetryConfig, with_retry};
use crate::schema::Catalog;
use crate::types::{
    Action, Change, ExecuteSummary, ExecutionResult, Operation, RemoteRecord, ResourceKey,
    Snapshots,
};
use std::collections::HashSet;

/// What happened to one planned step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub key: ResourceKey,
    pub action: Action,
    pub result: ExecutionResult,
}

/// Everything a pass produced
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// One outcome per step, in plan order
    pub outcomes: Vec<StepOutcome>,
    /// Snapshots after the pass, ready to persist
    pub snapshots: Snapshots,
    pub summary: ExecuteSummary,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    pub fn outcome(&self, key: &ResourceKey) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    /// Outcomes whose step failed
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, ExecutionResult::Failed { .. }))
    }

    /// The first error in plan order
    pub fn first_error(&self) -> Option<&Error> {
        self.outcomes.iter().find_map(|o| o.result.error())
    }
}

/// Execute a plan against a remote client.
///
/// # Arguments
/// * `plan` - Ordered steps from [`crate::planner::plan`]
/// * `client` - Remote client facade
/// * `catalog` - Kind tables, used when a step must be re-planned
/// * `snapshots` - Records the plan was computed from
/// * `options` - Dry run and retry policy
/// * `cancel` - Checked before each step
/// * `progress` - Progress callback
///
/// # Returns
/// Report with per-step outcomes and the updated snapshots. Never fails as
/// a whole: every step yields a result.
pub fn execute<P>(
    plan: &ExecutionPlan,
    client: &dyn RemoteClient,
    catalog: &Catalog,
    snapshots: &Snapshots,
    options: &ExecuteOptions,
    cancel: &CancellationToken,
    progress: &mut P,
) -> ExecutionReport
where
    P: ProgressCallback + ?Sized,
{
    let runner = StepRunner {
        client,
        catalog,
        retry: &options.retry,
    };
    let mut report = ExecutionReport {
        snapshots: snapshots.clone(),
        ..ExecutionReport::default()
    };
    let mut blocked: HashSet<ResourceKey> = HashSet::new();

    progress.on_pass_start(plan.len());

    for step in &plan.steps {
        let key = step.key();
        let action = step.operation.action();
        progress.on_step_start(&key, action);

        let result = if cancel.is_cancelled() {
            ExecutionResult::skipped("cancelled")
        } else if let Some(dep) = step.dependencies.iter().find(|d| blocked.contains(*d)) {
            ExecutionResult::skipped(format!("dependency {dep} failed"))
        } else if let Operation::NoOp { record, .. } = &step.operation {
            ExecutionResult::applied(Change::NoChange, Some(record.clone()))
        } else if options.dry_run {
            ExecutionResult::skipped("dry run")
        } else {
            log::debug!("dispatching {action} {key}");
            runner.run(step)
        };

        match &result {
            ExecutionResult::Applied {
                record: Some(record),
                ..
            } => {
                report.snapshots.insert(key.clone(), record.clone());
            }
            ExecutionResult::Applied { record: None, .. } => {
                report.snapshots.shift_remove(&key);
            }
            ExecutionResult::Failed { error, .. } => {
                log::debug!("{action} {key} failed: {error}");
                blocked.insert(key.clone());
            }
            ExecutionResult::Skipped { .. } if !options.dry_run => {
                blocked.insert(key.clone());
            }
            ExecutionResult::Skipped { .. } => {}
        }

        report.summary.add_result(&result);
        progress.on_step_complete(&key, &result);
        report.outcomes.push(StepOutcome {
            key,
            action,
            result,
        });
    }

    progress.on_pass_complete(&report.summary);
    report
}

/// Execute a plan with default options and no callbacks
pub fn execute_simple(
    plan: &ExecutionPlan,
    client: &dyn RemoteClient,
    catalog: &Catalog,
    snapshots: &Snapshots,
) -> ExecutionReport {
    execute(
        plan,
        client,
        catalog,
        snapshots,
        &ExecuteOptions::default(),
        &CancellationToken::new(),
        &mut NoProgress,
    )
}

struct StepRunner<'a> {
    client: &'a dyn RemoteClient,
    catalog: &'a Catalog,
    retry: &'a RetryConfig,
}

impl StepRunner<'_> {
    fn run(&self, step: &PlannedStep) -> ExecutionResult {
        let op = &step.operation;
        match self.dispatch(op) {
            Ok(result) => result,
            Err(e) if needs_replan(op, &e) => {
                log::info!("{e}; re-reading {} and planning again", op.key());
                match self.replan(op) {
                    Ok(Some(fresh)) => self.dispatch(&fresh).unwrap_or_else(ExecutionResult::failed),
                    Ok(None) => ExecutionResult::applied(Change::Deleted, None),
                    Err(e) => ExecutionResult::failed(e),
                }
            }
            Err(e) => ExecutionResult::failed(e),
        }
    }

    fn dispatch(&self, op: &Operation) -> Result<ExecutionResult> {
        match op {
            Operation::NoOp { record, .. } => {
                Ok(ExecutionResult::applied(Change::NoChange, Some(record.clone())))
            }
            Operation::Create(spec) => {
                let mut timed_out = false;
                let record = with_retry(self.retry, Some(&LogCallback), || {
                    self.create_once(spec, &mut timed_out)
                })?;
                Ok(ExecutionResult::applied(Change::Created, Some(record)))
            }
            Operation::Update {
                spec,
                record,
                version,
            } => {
                let record = with_retry(self.retry, Some(&LogCallback), || {
                    self.update_once(&record.id, spec, version)
                })?;
                Ok(ExecutionResult::applied(Change::Updated, Some(record)))
            }
            Operation::Delete { record, version } => {
                with_retry(self.retry, Some(&LogCallback), || {
                    self.delete_once(record, version)
                })?;
                Ok(ExecutionResult::applied(Change::Deleted, None))
            }
        }
    }

    /// Whether a remote record already reflects the spec
    fn reflects(&self, spec: &ResourceSpec, record: &RemoteRecord) -> bool {
        self.catalog.get(spec.kind()).is_some_and(|schema| {
            diff::changed_fields(schema, spec.attributes(), &record.attributes).is_empty()
        })
    }

    fn create_once(&self, spec: &ResourceSpec, timed_out: &mut bool) -> Result<RemoteRecord> {
        match self.client.create(spec) {
            Err(e @ Error::RemoteTimeout { .. }) => {
                *timed_out = true;
                log::warn!("{e}; checking whether the create took effect");
                match self.client.fetch_optional(spec.kind(), spec.name()) {
                    Ok(Some(record)) if self.reflects(spec, &record) => Ok(record),
                    Ok(Some(_)) => Err(exists_with_other_attributes(spec)),
                    Ok(None) | Err(_) => Err(e),
                }
            }
            // an earlier attempt may have landed without us hearing back
            Err(e @ Error::Conflict { .. }) if *timed_out => {
                match self.client.fetch_optional(spec.kind(), spec.name())? {
                    Some(record) if self.reflects(spec, &record) => Ok(record),
                    _ => Err(e),
                }
            }
            other => other,
        }
    }

    fn update_once(&self, id: &str, spec: &ResourceSpec, version: &str) -> Result<RemoteRecord> {
        match self.client.update(id, spec, version) {
            Err(e @ Error::RemoteTimeout { .. }) => {
                log::warn!("{e}; checking whether the update took effect");
                match self.client.fetch_optional(spec.kind(), id) {
                    Ok(Some(record)) if self.reflects(spec, &record) => Ok(record),
                    _ => Err(e),
                }
            }
            other => other,
        }
    }

    fn delete_once(&self, record: &RemoteRecord, version: &str) -> Result<()> {
        match self.client.delete(&record.kind, &record.id, version) {
            Ok(()) | Err(Error::NotFound { .. }) => Ok(()),
            Err(e @ Error::RemoteTimeout { .. }) => {
                log::warn!("{e}; checking whether the delete took effect");
                match self.client.fetch_optional(&record.kind, &record.id) {
                    Ok(None) => Ok(()),
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Re-fetch and diff one resource again. `None` means a delete found
    /// the resource already gone.
    fn replan(&self, op: &Operation) -> Result<Option<Operation>> {
        let key = op.key();
        let current = self.client.fetch_optional(&key.kind, &key.name)?;
        match (op, current) {
            (Operation::Delete { .. }, None) => Ok(None),
            (Operation::Delete { .. }, Some(record)) => Ok(Some(Operation::Delete {
                version: record.version.clone(),
                record,
            })),
            (_, current) => {
                let Some(spec) = op.spec() else {
                    return Ok(None);
                };
                let schema = self.catalog.require(spec.kind(), spec.name())?;
                diff::plan_resource(schema, spec, current.as_ref()).map(Some)
            }
        }
    }
}

fn needs_replan(op: &Operation, error: &Error) -> bool {
    match (op, error) {
        (Operation::Update { .. } | Operation::Delete { .. }, Error::VersionMismatch { .. }) => true,
        (Operation::Update { .. }, Error::NotFound { .. }) => true,
        _ => false,
    }
}

fn exists_with_other_attributes(spec: &ResourceSpec) -> Error {
    Error::Conflict {
        kind: spec.kind().to_string(),
        id: spec.name().to_string(),
        message: "a resource with this name appeared with different attributes".to_string(),
    }
}
