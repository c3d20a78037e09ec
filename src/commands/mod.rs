//! Subcommand implementations

pub mod apply;
pub mod check;
pub mod destroy;
pub mod import;
pub mod plan;
pub mod verify;

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{
    Catalog, ExecutionReport, ExecutionResult, RemoteClient, ResourceSpec, Snapshots, refresh,
};
use std::path::PathBuf;

use crate::config;
use crate::state::State;
use crate::ui;

/// Load every resource from the given config files, in order
pub fn load_specs(files: &[PathBuf], catalog: &Catalog) -> Result<Vec<ResourceSpec>> {
    let mut specs = Vec::new();
    for file in files {
        specs.extend(config::load_resources(file, catalog)?);
    }
    log::debug!("Loaded {} resource(s) from {} file(s)", specs.len(), files.len());
    Ok(specs)
}

/// Snapshots to plan from: recorded state, re-read from the server unless
/// `no_refresh` is set
pub fn current_snapshots(
    client: &dyn RemoteClient,
    state: &State,
    no_refresh: bool,
) -> Result<Snapshots> {
    let recorded = state.snapshots();
    if no_refresh {
        return Ok(recorded);
    }
    refresh(client, &recorded).context("Failed to refresh state from the server")
}

/// Ask before a change; `--yes` and non-interactive callers skip this
pub fn confirm(prompt: &str) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmed)
}

/// Print a pass's failures and summary; fails when anything did not apply
pub fn finish(report: &ExecutionReport, verbose: u8) -> Result<()> {
    for outcome in report.failures() {
        if let ExecutionResult::Failed { error, .. } = &outcome.result {
            ui::error(&format!("{} {}: {}", outcome.action, outcome.key, error));
            let category = error.category();
            if verbose > 0 {
                ui::dim(&format!("{}: {}", category, category.advice()));
            } else {
                ui::dim(category.advice());
            }
        }
    }
    ui::display_summary(&report.summary);

    if report.is_success() {
        return Ok(());
    }
    bail!(
        "{} operation(s) failed, {} skipped",
        report.summary.failed,
        report.summary.skipped
    )
}
