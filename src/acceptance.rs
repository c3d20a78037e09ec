//! Acceptance scenarios
//!
//! A scenario is a TOML file of steps run in order against one server:
//!
//! ```toml
//! check_destroy = true
//!
//! [[step]]
//! config = "pipeline.toml"
//! remove_before = ["pipeline.pipeline0-terraform"]
//! import = ["pipeline_template.template1"]
//!
//! [[step.check]]
//! resource = "pipeline.pipeline0-terraform"
//! attribute = "group"
//! equals = "testing"
//! ```
//!
//! Each step reconciles its config file, then asserts attributes of the
//! resulting records and that a second plan has nothing left to do. When
//! `expect_error` is set the step must fail with a matching message
//! instead. Keys listed under `import` are re-read from the server before
//! the config runs, as `pipewright import` would. Teardown destroys whatever the steps created and checks the
//! server no longer reports it.

use anyhow::{Context, Result};
use declarative::{
    CancellationToken, Catalog, ExecuteOptions, NoProgress, RemoteClient, ResourceKey,
    RetryConfig, Snapshots, changed_fields, execute, plan, plan_destroy, refresh, resolve,
    verify_all,
};
use regex::Regex;
use serde::Deserialize;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,

    /// Destroy everything at teardown and verify it is gone
    #[serde(default = "default_true")]
    pub check_destroy: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Resource file, relative to the scenario file
    pub config: PathBuf,

    /// Resources deleted out of band before the step runs
    #[serde(default)]
    pub remove_before: Vec<String>,

    /// Resources re-read from the server into state before the config is
    /// applied; each must match what state recorded and plan to no change
    #[serde(default)]
    pub import: Vec<String>,

    /// The step must fail with a message matching this pattern
    #[serde(default)]
    pub expect_error: Option<String>,

    #[serde(default, rename = "check")]
    pub checks: Vec<Check>,
}

/// Expect `attribute` of `resource` to render as `equals`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Check {
    pub resource: String,
    pub attribute: String,
    pub equals: String,
}

/// Why a scenario did not pass. Steps are numbered from 1.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioFailure {
    #[error("step {step}: {message}")]
    Setup { step: usize, message: String },

    #[error("step {step}: unexpected error: {message}")]
    Unexpected { step: usize, message: String },

    #[error("step {step}: expected an error matching /{pattern}/ but the step succeeded")]
    MissingError { step: usize, pattern: String },

    #[error("step {step}: error did not match /{pattern}/: {message}")]
    ErrorMismatch {
        step: usize,
        pattern: String,
        message: String,
    },

    #[error("step {step}: {resource} is not in state")]
    MissingResource { step: usize, resource: String },

    #[error(
        "step {step}: {resource}.{attribute}: expected {expected:?}, got {actual:?}\n    diff: {diff}"
    )]
    CheckFailed {
        step: usize,
        resource: String,
        attribute: String,
        expected: String,
        actual: String,
        diff: String,
    },

    #[error("step {step}: plan still has changes for {}", .resources.join(", "))]
    PlanNotEmpty { step: usize, resources: Vec<String> },

    #[error("step {step}: imported {resource} differs from state in {}", .fields.join(", "))]
    ImportMismatch {
        step: usize,
        resource: String,
        fields: Vec<String>,
    },

    #[error("teardown: {message}")]
    Teardown { message: String },
}

/// Result of one scenario run
#[derive(Debug, Default)]
pub struct ScenarioOutcome {
    /// Steps that ran to completion
    pub steps_passed: usize,
    pub failures: Vec<ScenarioFailure>,
}

impl ScenarioOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read a scenario file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid scenario {}", path.display()))
}

/// Runs scenarios against one client
pub struct ScenarioRunner<'a> {
    client: &'a dyn RemoteClient,
    catalog: &'a Catalog,
    retry: RetryConfig,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(client: &'a dyn RemoteClient, catalog: &'a Catalog) -> Self {
        Self {
            client,
            catalog,
            retry: RetryConfig::default(),
        }
    }

    /// Run every step, stopping at the first failure, then tear down.
    ///
    /// Config paths are resolved against `base_dir`.
    pub fn run(&self, scenario: &Scenario, base_dir: &Path) -> ScenarioOutcome {
        let mut outcome = ScenarioOutcome::default();
        let mut state = Snapshots::new();

        for (index, step) in scenario.steps.iter().enumerate() {
            let number = index + 1;
            log::info!("scenario step {number}: {}", step.config.display());
            match self.run_step(number, step, base_dir, &mut state) {
                Ok(()) => outcome.steps_passed += 1,
                Err(failure) => {
                    outcome.failures.push(failure);
                    break;
                }
            }
        }

        if scenario.check_destroy
            && let Err(failure) = self.teardown(&state)
        {
            outcome.failures.push(failure);
        }
        outcome
    }

    fn run_step(
        &self,
        number: usize,
        step: &Step,
        base_dir: &Path,
        state: &mut Snapshots,
    ) -> Result<(), ScenarioFailure> {
        let setup = |message: String| ScenarioFailure::Setup {
            step: number,
            message,
        };

        let pattern = step
            .expect_error
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| setup(format!("invalid expect_error pattern: {e}")))?;

        for address in &step.remove_before {
            let key = ResourceKey::parse(address)
                .ok_or_else(|| setup(format!("invalid remove_before address '{address}'")))?;
            self.remove_out_of_band(&key).map_err(|e| setup(e.to_string()))?;
        }

        let path = base_dir.join(&step.config);
        if !step.import.is_empty() {
            for address in &step.import {
                let key = ResourceKey::parse(address)
                    .ok_or_else(|| setup(format!("invalid import address '{address}'")))?;
                self.import(number, &key, state)?;
            }
            self.check_plan_empty(number, &path, state)?;
        }
        let error = match self.apply(&path, state) {
            Ok(()) => None,
            Err(e) => Some(format!("{e:#}")),
        };

        match (pattern, error) {
            (Some(pattern), Some(message)) if pattern.is_match(&message) => {
                log::info!("step {number} failed as expected: {message}");
                Ok(())
            }
            (Some(pattern), Some(message)) => Err(ScenarioFailure::ErrorMismatch {
                step: number,
                pattern: pattern.to_string(),
                message,
            }),
            (Some(pattern), None) => Err(ScenarioFailure::MissingError {
                step: number,
                pattern: pattern.to_string(),
            }),
            (None, Some(message)) => Err(ScenarioFailure::Unexpected {
                step: number,
                message,
            }),
            (None, None) => {
                self.check_plan_empty(number, &path, state)?;
                step.checks
                    .iter()
                    .try_for_each(|check| run_check(number, check, state))
            }
        }
    }

    /// Replace the state entry for `key` with a fresh import of it
    fn import(
        &self,
        number: usize,
        key: &ResourceKey,
        state: &mut Snapshots,
    ) -> Result<(), ScenarioFailure> {
        let imported = resolve(self.client, self.catalog, &key.kind, &key.name).map_err(|e| {
            ScenarioFailure::Unexpected {
                step: number,
                message: format!("import {key}: {e}"),
            }
        })?;

        if let (Some(prior), Some(schema)) = (state.get(key), self.catalog.get(&key.kind)) {
            let fields: Vec<String> =
                changed_fields(schema, imported.spec.attributes(), &prior.attributes)
                    .into_iter()
                    .map(|c| c.field)
                    .collect();
            if !fields.is_empty() {
                return Err(ScenarioFailure::ImportMismatch {
                    step: number,
                    resource: key.to_string(),
                    fields,
                });
            }
        }
        log::info!("imported {key} at version {}", imported.record.version);
        state.insert(key.clone(), imported.record);
        Ok(())
    }

    /// Refresh, plan and execute one config file, keeping whatever the pass
    /// recorded even when it fails
    fn apply(&self, path: &Path, state: &mut Snapshots) -> Result<()> {
        let specs = config::load_resources(path, self.catalog)?;
        let refreshed = refresh(self.client, state)?;
        *state = refreshed;
        let plan = plan(self.catalog, &specs, state)?;

        let options = ExecuteOptions::new(false).with_retry(self.retry.clone());
        let report = execute(
            &plan,
            self.client,
            self.catalog,
            state,
            &options,
            &CancellationToken::new(),
            &mut NoProgress,
        );
        *state = report.snapshots.clone();

        if let Some(error) = report.first_error() {
            return Err(error.clone().into());
        }
        Ok(())
    }

    fn check_plan_empty(
        &self,
        number: usize,
        path: &Path,
        state: &mut Snapshots,
    ) -> Result<(), ScenarioFailure> {
        let resources =
            self.pending_changes(path, state)
                .map_err(|e| ScenarioFailure::Unexpected {
                    step: number,
                    message: format!("{e:#}"),
                })?;
        if resources.is_empty() {
            Ok(())
        } else {
            Err(ScenarioFailure::PlanNotEmpty {
                step: number,
                resources,
            })
        }
    }

    /// Keys a fresh plan would still mutate
    fn pending_changes(&self, path: &Path, state: &mut Snapshots) -> Result<Vec<String>> {
        let specs = config::load_resources(path, self.catalog)?;
        *state = refresh(self.client, state)?;
        let plan = plan(self.catalog, &specs, state)?;
        Ok(plan
            .steps
            .iter()
            .filter(|s| s.operation.action().is_mutation())
            .map(|s| s.key().to_string())
            .collect())
    }

    fn remove_out_of_band(&self, key: &ResourceKey) -> declarative::Result<()> {
        let Some(record) = self.client.fetch_optional(&key.kind, &key.name)? else {
            log::debug!("{key} already absent");
            return Ok(());
        };
        log::info!("removing {key} out of band");
        self.client.delete(&key.kind, &key.name, &record.version)
    }

    fn teardown(&self, state: &Snapshots) -> Result<(), ScenarioFailure> {
        let options = ExecuteOptions::new(false).with_retry(self.retry.clone());
        let destroy = plan_destroy(self.catalog, state).map_err(|e| ScenarioFailure::Teardown {
            message: e.to_string(),
        })?;
        let report = execute(
            &destroy,
            self.client,
            self.catalog,
            state,
            &options,
            &CancellationToken::new(),
            &mut NoProgress,
        );
        if let Some(error) = report.first_error() {
            return Err(ScenarioFailure::Teardown {
                message: error.to_string(),
            });
        }

        let keys: Vec<ResourceKey> = state.keys().cloned().collect();
        let leftovers = verify_all(self.client, &keys, state);
        if leftovers.is_empty() {
            Ok(())
        } else {
            let messages: Vec<String> = leftovers.iter().map(ToString::to_string).collect();
            Err(ScenarioFailure::Teardown {
                message: messages.join("; "),
            })
        }
    }
}

fn run_check(number: usize, check: &Check, state: &Snapshots) -> Result<(), ScenarioFailure> {
    let record = ResourceKey::parse(&check.resource)
        .and_then(|key| state.get(&key))
        .ok_or_else(|| ScenarioFailure::MissingResource {
            step: number,
            resource: check.resource.clone(),
        })?;

    let actual = match check.attribute.as_str() {
        "name" | "id" => record.id.clone(),
        attribute => record
            .attributes
            .get(attribute)
            .map(declarative::AttrValue::render)
            .unwrap_or_default(),
    };

    if actual == check.equals {
        return Ok(());
    }
    Err(ScenarioFailure::CheckFailed {
        step: number,
        resource: check.resource.clone(),
        attribute: check.attribute.clone(),
        diff: char_diff(&check.equals, &actual),
        expected: check.equals.clone(),
        actual,
    })
}

/// Inline character diff: `[-removed-]` and `{+added+}` around changed runs
pub fn char_diff(expected: &str, actual: &str) -> String {
    let diff = TextDiff::from_chars(expected, actual);
    let mut out = String::new();
    let mut run: Option<(ChangeTag, String)> = None;

    for change in diff.iter_all_changes() {
        match &mut run {
            Some((tag, text)) if *tag == change.tag() => text.push_str(change.value()),
            _ => {
                if let Some((tag, text)) = run.take() {
                    push_run(&mut out, tag, &text);
                }
                run = Some((change.tag(), change.value().to_string()));
            }
        }
    }
    if let Some((tag, text)) = run {
        push_run(&mut out, tag, &text);
    }
    out
}

fn push_run(out: &mut String, tag: ChangeTag, text: &str) {
    match tag {
        ChangeTag::Equal => out.push_str(text),
        ChangeTag::Delete => out.push_str(&format!("[-{text}-]")),
        ChangeTag::Insert => out.push_str(&format!("{{+{text}+}}")),
    }
}
