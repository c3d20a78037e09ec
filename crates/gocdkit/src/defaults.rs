//! Values GoCD fills in when a declaration leaves them out
//!
//! Records read back from the server spell out every optional key of a
//! material, stage, job and task. The differ runs both sides through these
//! normalizers, which drop keys holding the server's implied value and any
//! key left holding null or an empty list or map. A minimal declaration
//! then compares equal to what the server reports for it.

use declarative::{AttrValue, Attributes};

#[derive(Debug, Clone, Copy)]
enum Implied {
    Bool(bool),
    Int(i64),
    Str(&'static str),
    Strs(&'static [&'static str]),
}

impl Implied {
    fn matches(self, value: &AttrValue) -> bool {
        match (self, value) {
            (Self::Bool(a), AttrValue::Bool(b)) => a == *b,
            (Self::Int(a), AttrValue::Int(b)) => a == *b,
            (Self::Str(a), AttrValue::String(b)) => a == b,
            (Self::Strs(a), AttrValue::List(items)) => {
                a.len() == items.len()
                    && a.iter().zip(items).all(|(x, y)| y.as_str() == Some(*x))
            }
            _ => false,
        }
    }
}

type Table = &'static [(&'static str, Implied)];

const SCM_MATERIAL: Table = &[("invert_filter", Implied::Bool(false))];
const GIT_MATERIAL: Table = &[
    ("branch", Implied::Str("master")),
    ("shallow_clone", Implied::Bool(false)),
    ("invert_filter", Implied::Bool(false)),
];
const SVN_MATERIAL: Table = &[
    ("check_externals", Implied::Bool(false)),
    ("invert_filter", Implied::Bool(false)),
];
const P4_MATERIAL: Table = &[
    ("use_tickets", Implied::Bool(false)),
    ("invert_filter", Implied::Bool(false)),
];
const DEPENDENCY_MATERIAL: Table = &[
    ("auto_update", Implied::Bool(true)),
    ("ignore_for_scheduling", Implied::Bool(false)),
];
const STAGE: Table = &[
    ("fetch_materials", Implied::Bool(true)),
    ("clean_working_directory", Implied::Bool(false)),
    ("never_cleanup_artifacts", Implied::Bool(false)),
];
const APPROVAL: Table = &[
    ("type", Implied::Str("success")),
    ("allow_only_on_success", Implied::Bool(false)),
];
const JOB: Table = &[("timeout", Implied::Int(0))];
const TASK: Table = &[("run_if", Implied::Strs(&["passed"]))];
const VARIABLE: Table = &[("secure", Implied::Bool(false))];

/// Normalizer for a pipeline's `materials`
pub fn materials(value: AttrValue) -> AttrValue {
    prune(each_map(value, |material| {
        let table = match material.get("type").and_then(AttrValue::as_str) {
            Some("git") => GIT_MATERIAL,
            Some("svn") => SVN_MATERIAL,
            Some("p4") => P4_MATERIAL,
            Some("dependency") => DEPENDENCY_MATERIAL,
            _ => SCM_MATERIAL,
        };
        in_child(material, "attributes", |attrs| drop_implied(attrs, table));
    }))
}

/// Normalizer for `stages`, on pipelines and templates alike
pub fn stages(value: AttrValue) -> AttrValue {
    prune(each_map(value, |stage| {
        drop_implied(stage, STAGE);
        in_child(stage, "approval", |approval| drop_implied(approval, APPROVAL));
        in_list(stage, "environment_variables", variable);
        in_list(stage, "jobs", |job| {
            drop_implied(job, JOB);
            in_list(job, "environment_variables", variable);
            in_list(job, "tasks", |task| {
                in_child(task, "attributes", |attrs| drop_implied(attrs, TASK));
            });
        });
    }))
}

/// Normalizer for `environment_variables`
pub fn environment_variables(value: AttrValue) -> AttrValue {
    prune(each_map(value, variable))
}

fn variable(var: &mut Attributes) {
    drop_implied(var, VARIABLE);
}

fn drop_implied(map: &mut Attributes, table: Table) {
    for (key, implied) in table {
        if map.get(*key).is_some_and(|v| implied.matches(v)) {
            map.shift_remove(*key);
        }
    }
}

fn each_map(value: AttrValue, mut f: impl FnMut(&mut Attributes)) -> AttrValue {
    match value {
        AttrValue::List(items) => AttrValue::List(
            items
                .into_iter()
                .map(|item| match item {
                    AttrValue::Map(mut map) => {
                        f(&mut map);
                        AttrValue::Map(map)
                    }
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn in_child(map: &mut Attributes, key: &str, f: impl FnOnce(&mut Attributes)) {
    if let Some(AttrValue::Map(child)) = map.get_mut(key) {
        f(child);
    }
}

fn in_list(map: &mut Attributes, key: &str, f: impl FnMut(&mut Attributes)) {
    if let Some(value) = map.shift_remove(key) {
        map.insert(key.to_string(), each_map(value, f));
    }
}

/// Drop null and empty entries from maps at every depth. List elements are
/// kept, since their position is meaningful.
fn prune(value: AttrValue) -> AttrValue {
    match value {
        AttrValue::Map(map) => AttrValue::Map(
            map.into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect(),
        ),
        AttrValue::List(items) => AttrValue::List(items.into_iter().map(prune).collect()),
        other => other,
    }
}

fn is_empty(value: &AttrValue) -> bool {
    match value {
        AttrValue::Null => true,
        AttrValue::List(items) => items.is_empty(),
        AttrValue::Map(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attr(value: serde_json::Value) -> AttrValue {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_git_material_defaults_dropped() {
        let remote = attr(json!([{
            "type": "git",
            "attributes": {
                "url": "https://github.com/gocd/gocd",
                "branch": "master",
                "shallow_clone": false,
                "invert_filter": false,
                "filter": { "ignore": [] }
            }
        }]));
        let declared = attr(json!([{ "type": "git", "attributes": { "url": "https://github.com/gocd/gocd" } }]));
        assert_eq!(materials(remote), materials(declared));
    }

    #[test]
    fn test_non_default_values_kept() {
        let remote = attr(json!([{
            "type": "git",
            "attributes": { "url": "u", "branch": "release", "shallow_clone": true }
        }]));
        let normalized = materials(remote.clone());
        assert_eq!(normalized, remote);
    }

    #[test]
    fn test_stage_job_and_task_defaults_dropped() {
        let remote = attr(json!([{
            "name": "build",
            "fetch_materials": true,
            "clean_working_directory": false,
            "never_cleanup_artifacts": false,
            "approval": {
                "type": "success",
                "allow_only_on_success": false,
                "authorization": { "roles": [], "users": [] }
            },
            "environment_variables": [],
            "jobs": [{
                "name": "compile",
                "timeout": 0,
                "resources": [],
                "tabs": [],
                "artifacts": [],
                "environment_variables": [{ "name": "CI", "value": "1", "secure": false }],
                "tasks": [{ "type": "exec", "attributes": { "run_if": ["passed"], "command": "make" } }]
            }]
        }]));
        let declared = attr(json!([{
            "name": "build",
            "jobs": [{
                "name": "compile",
                "environment_variables": [{ "name": "CI", "value": "1" }],
                "tasks": [{ "type": "exec", "attributes": { "command": "make" } }]
            }]
        }]));
        assert_eq!(stages(remote), stages(declared));
    }

    #[test]
    fn test_manual_approval_is_a_difference() {
        let manual = attr(json!([{ "name": "deploy", "approval": { "type": "manual" }, "jobs": [] }]));
        let plain = attr(json!([{ "name": "deploy", "jobs": [] }]));
        assert_ne!(stages(manual), stages(plain));
    }
}
