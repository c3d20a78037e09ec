//! Execution planner - turns a batch of specs into an ordered plan

use crate::client::RemoteClient;
use crate::diff::{self, ResourceDiff};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::resource::ResourceSpec;
use crate::schema::Catalog;
use crate::types::{Operation, RemoteRecord, ResourceKey, Snapshots};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// One step of a plan, with the batch keys it must wait for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub operation: Operation,
    pub dependencies: BTreeSet<ResourceKey>,
}

impl PlannedStep {
    pub fn key(&self) -> ResourceKey {
        self.operation.key()
    }
}

/// An ordered list of operations, dependencies before dependents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of steps in the plan
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether any step would mutate the remote system
    pub fn has_changes(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.operation.action().is_mutation())
    }

    /// Display diffs for every mutating step
    pub fn diffs(&self, catalog: &Catalog) -> Vec<ResourceDiff> {
        self.steps
            .iter()
            .filter_map(|s| {
                let schema = catalog.get(&s.operation.key().kind);
                ResourceDiff::from_operation(schema, &s.operation)
            })
            .collect()
    }

    /// Filter plan to only include steps matching a target pattern
    ///
    /// Target format: "kind" or "kind.name". Dependencies on dropped steps
    /// are forgotten, since the caller chose not to run them.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        let Some(target) = target else {
            return self;
        };
        let (kind, name) = parse_target(target);
        let steps: Vec<PlannedStep> = self
            .steps
            .into_iter()
            .filter(|s| {
                let key = s.key();
                key.kind == kind && name.is_none_or(|n| key.name == n)
            })
            .collect();
        let kept: HashSet<ResourceKey> = steps.iter().map(PlannedStep::key).collect();
        let steps = steps
            .into_iter()
            .map(|mut s| {
                s.dependencies.retain(|d| kept.contains(d));
                s
            })
            .collect();
        Self { steps }
    }
}

/// Parse a target string like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('.') {
        Some((kind, name)) => (kind, Some(name)),
        None => (target, None),
    }
}

/// Plan a batch of specs against the last-known snapshots.
///
/// Makes no remote calls. Fails before producing any step when the batch
/// has duplicate keys, a dependency cycle, an immutable field change, or a
/// spec depending on a resource about to be deleted.
pub fn plan(catalog: &Catalog, specs: &[ResourceSpec], snapshots: &Snapshots) -> Result<ExecutionPlan> {
    let mut graph = DependencyGraph::new();
    for spec in specs {
        if graph.contains(spec.key()) {
            return Err(Error::validation(
                spec.kind(),
                spec.name(),
                "declared more than once",
            ));
        }
        graph.add_node(spec.key().clone());
    }

    let orphans: Vec<&RemoteRecord> = snapshots
        .iter()
        .filter(|(key, _)| !graph.contains(key))
        .map(|(_, record)| record)
        .collect();
    let deleted: HashSet<ResourceKey> = orphans.iter().map(|r| r.key()).collect();

    for spec in specs {
        for dep in spec.dependencies() {
            if deleted.contains(dep) {
                return Err(Error::validation(
                    spec.kind(),
                    spec.name(),
                    format!("depends on {dep}, which is no longer declared and would be deleted"),
                ));
            }
            // dependencies outside the batch are assumed to exist remotely
            graph.add_dependency(spec.key(), dep);
        }
    }

    let order = graph.toposort()?;
    let by_key = |key: &ResourceKey| specs.iter().find(|s| s.key() == key);

    let mut steps = Vec::with_capacity(order.len() + orphans.len());
    for key in &order {
        let Some(spec) = by_key(key) else {
            continue;
        };
        let schema = catalog.require(spec.kind(), spec.name())?;
        let operation = diff::plan_resource(schema, spec, snapshots.get(key))?;
        let dependencies = spec
            .dependencies()
            .iter()
            .filter(|d| graph.contains(d))
            .cloned()
            .collect();
        log::debug!("planned {} {}", operation.action(), key);
        steps.push(PlannedStep {
            operation,
            dependencies,
        });
    }

    steps.extend(delete_steps(catalog, orphans)?);
    Ok(ExecutionPlan { steps })
}

/// Plan deleting every resource in the snapshots.
///
/// Dependents go before the resources they reference. Fails with
/// `DependencyCycle` if the recorded references loop.
pub fn plan_destroy(catalog: &Catalog, snapshots: &Snapshots) -> Result<ExecutionPlan> {
    Ok(ExecutionPlan {
        steps: delete_steps(catalog, snapshots.values().collect())?,
    })
}

// Reverse topological order over the references found in the records;
// unrelated records go newest first. Each delete waits on the in-batch
// resources that still reference it.
fn delete_steps(catalog: &Catalog, records: Vec<&RemoteRecord>) -> Result<Vec<PlannedStep>> {
    let mut graph = DependencyGraph::new();
    for record in records.iter().rev() {
        graph.add_node(record.key());
    }

    let mut dependents: HashMap<ResourceKey, BTreeSet<ResourceKey>> = HashMap::new();
    for record in &records {
        let Some(schema) = catalog.get(&record.kind) else {
            continue;
        };
        let key = record.key();
        for reference in (schema.references)(&record.attributes) {
            // the dependent is deleted first, so it is the graph's "dependency"
            if reference != key && graph.add_dependency(&reference, &key) {
                dependents.entry(reference).or_default().insert(key.clone());
            }
        }
    }

    let mut by_key: HashMap<ResourceKey, &RemoteRecord> =
        records.iter().map(|r| (r.key(), *r)).collect();
    let mut steps = Vec::with_capacity(records.len());
    for key in graph.toposort()? {
        let Some(record) = by_key.remove(&key) else {
            continue;
        };
        log::debug!("planned delete {key}");
        steps.push(PlannedStep {
            operation: Operation::Delete {
                record: record.clone(),
                version: record.version.clone(),
            },
            dependencies: dependents.remove(&key).unwrap_or_default(),
        });
    }
    Ok(steps)
}

/// Re-read every snapshot from the remote system.
///
/// Fetches run in parallel. Records the remote reports missing are dropped;
/// any other failure aborts the refresh. Never mutates the remote.
pub fn refresh(client: &dyn RemoteClient, snapshots: &Snapshots) -> Result<Snapshots> {
    let keys: Vec<&ResourceKey> = snapshots.keys().collect();
    let fetched: Vec<Result<Option<RemoteRecord>>> = keys
        .par_iter()
        .map(|key| client.fetch_optional(&key.kind, &key.name))
        .collect();

    let mut refreshed = Snapshots::new();
    for (key, result) in keys.into_iter().zip(fetched) {
        match result? {
            Some(record) => {
                refreshed.insert(key.clone(), record);
            }
            None => log::info!("{key} no longer exists remotely, dropping from state"),
        }
    }
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use crate::schema::tests::{WIDGET, catalog};
    use crate::types::{Action, AttrValue, Attributes};

    fn widget(name: &str, parent: Option<&str>) -> ResourceSpec {
        let mut a = Attributes::new();
        a.insert("color".into(), "red".into());
        if let Some(p) = parent {
            a.insert("parent".into(), p.into());
        }
        ResourceSpec::new(&WIDGET, name, a, []).unwrap()
    }

    fn widget_after(name: &str, deps: &[&str]) -> ResourceSpec {
        let mut a = Attributes::new();
        a.insert("color".into(), "red".into());
        let deps: Vec<_> = deps.iter().map(|d| ResourceKey::new("widget", *d)).collect();
        ResourceSpec::new(&WIDGET, name, a, deps).unwrap()
    }

    fn record(spec: &ResourceSpec, version: &str) -> RemoteRecord {
        RemoteRecord {
            kind: spec.kind().into(),
            id: spec.name().into(),
            attributes: spec.attributes().clone(),
            version: version.into(),
        }
    }

    fn keys(plan: &ExecutionPlan) -> Vec<String> {
        plan.steps.iter().map(|s| s.key().to_string()).collect()
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let specs = vec![widget("child", Some("base")), widget("base", None)];
        let plan = plan(&catalog(), &specs, &Snapshots::new()).unwrap();

        assert_eq!(keys(&plan), vec!["widget.base", "widget.child"]);
        assert!(plan.steps.iter().all(|s| s.operation.action() == Action::Create));
        assert_eq!(
            plan.steps[1].dependencies.iter().next(),
            Some(&ResourceKey::new("widget", "base"))
        );
    }

    #[test]
    fn test_plan_rejects_duplicates() {
        let specs = vec![widget("w", None), widget("w", None)];
        let err = plan(&catalog(), &specs, &Snapshots::new()).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_plan_rejects_cycle() {
        let specs = vec![widget_after("a", &["b"]), widget_after("b", &["a"])];
        let err = plan(&catalog(), &specs, &Snapshots::new()).unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { .. }));
    }

    #[test]
    fn test_plan_deletes_orphans_newest_first() {
        let kept = widget("kept", None);
        let mut snapshots = Snapshots::new();
        for s in [widget("old", None), kept.clone(), widget("new", None)] {
            snapshots.insert(s.key().clone(), record(&s, "v1"));
        }

        let plan = plan(&catalog(), &[kept], &snapshots).unwrap();
        assert_eq!(keys(&plan), vec!["widget.kept", "widget.new", "widget.old"]);
        assert_eq!(plan.steps[0].operation.action(), Action::NoOp);
        assert_eq!(plan.steps[1].operation.action(), Action::Delete);
        assert!(plan.has_changes());
    }

    #[test]
    fn test_plan_rejects_dependency_on_deleted() {
        let base = widget("base", None);
        let mut snapshots = Snapshots::new();
        snapshots.insert(base.key().clone(), record(&base, "v1"));

        let err = plan(&catalog(), &[widget("child", Some("base"))], &snapshots).unwrap_err();
        assert!(err.to_string().contains("would be deleted"));
    }

    #[test]
    fn test_plan_destroy() {
        let mut snapshots = Snapshots::new();
        for s in [widget("a", None), widget("b", None)] {
            snapshots.insert(s.key().clone(), record(&s, "v1"));
        }
        let plan = plan_destroy(&catalog(), &snapshots).unwrap();
        assert_eq!(keys(&plan), vec!["widget.b", "widget.a"]);
    }

    #[test]
    fn test_plan_destroy_deletes_dependents_first() {
        // recorded out of order, as an import can leave them
        let mut snapshots = Snapshots::new();
        for s in [widget("child", Some("base")), widget("base", None), widget("other", None)] {
            snapshots.insert(s.key().clone(), record(&s, "v1"));
        }

        let plan = plan_destroy(&catalog(), &snapshots).unwrap();
        assert_eq!(keys(&plan), vec!["widget.other", "widget.child", "widget.base"]);
        let base = &plan.steps[2];
        assert_eq!(
            base.dependencies.iter().collect::<Vec<_>>(),
            vec![&ResourceKey::new("widget", "child")]
        );
        assert!(plan.steps[1].dependencies.is_empty());
    }

    #[test]
    fn test_orphan_deletes_respect_references() {
        let kept = widget("kept", None);
        let mut snapshots = Snapshots::new();
        for s in [widget("child", Some("base")), kept.clone(), widget("base", None)] {
            snapshots.insert(s.key().clone(), record(&s, "v1"));
        }

        let plan = plan(&catalog(), &[kept], &snapshots).unwrap();
        assert_eq!(keys(&plan), vec!["widget.kept", "widget.child", "widget.base"]);
    }

    #[test]
    fn test_filter_by_target() {
        let specs = vec![widget("base", None), widget("child", Some("base"))];
        let plan = plan(&catalog(), &specs, &Snapshots::new()).unwrap();

        let filtered = plan.clone().filter_by_target(Some("widget.child"));
        assert_eq!(keys(&filtered), vec!["widget.child"]);
        assert!(filtered.steps[0].dependencies.is_empty());

        assert_eq!(plan.clone().filter_by_target(Some("widget")).len(), 2);
        assert!(plan.clone().filter_by_target(Some("gadget")).is_empty());
        assert_eq!(plan.filter_by_target(None).len(), 2);
    }

    #[test]
    fn test_diffs_skip_noops() {
        let s = widget("w", None);
        let mut snapshots = Snapshots::new();
        let mut r = record(&s, "v1");
        r.attributes.insert("size".into(), AttrValue::Int(5));
        snapshots.insert(s.key().clone(), r);

        let plan = plan(&catalog(), &[s, widget("x", None)], &snapshots).unwrap();
        let diffs = plan.diffs(&catalog());
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].changes[0].field, "size");
    }

    #[test]
    fn test_refresh_drops_missing_and_updates_stale() {
        let client = MemoryClient::new();
        let a = client.create(&widget("a", None)).unwrap();
        let b = client.create(&widget("b", None)).unwrap();
        client.tamper("widget", "a", "color", "blue".into());
        client.remove("widget", "b");

        let mut snapshots = Snapshots::new();
        snapshots.insert(a.key(), a);
        snapshots.insert(b.key(), b);

        let refreshed = refresh(&client, &snapshots).unwrap();
        assert_eq!(refreshed.len(), 1);
        let a = refreshed.get(&ResourceKey::new("widget", "a")).unwrap();
        assert_eq!(a.attributes.get("color"), Some(&AttrValue::from("blue")));
        assert_eq!(client.mutation_count(), 0);
    }
}
