//! `pipewright check`

use anyhow::{Result, bail};
use std::path::Path;

use crate::Context;
use crate::acceptance::{ScenarioRunner, load_scenario};
use crate::ui;

pub fn run(ctx: &Context, scenario_path: &Path) -> Result<()> {
    let scenario = load_scenario(scenario_path)?;
    let client = ctx.client()?;
    let catalog = gocdkit::catalog();
    let base_dir = scenario_path.parent().unwrap_or_else(|| Path::new("."));

    if !ctx.quiet {
        ui::header(&format!("Scenario {}", scenario_path.display()));
        ui::kv("steps", &scenario.steps.len().to_string());
    }
    if !scenario.check_destroy {
        ui::warn("check_destroy is off: resources will be left on the server");
    }

    let outcome = ScenarioRunner::new(&client, &catalog).run(&scenario, base_dir);
    for failure in &outcome.failures {
        ui::error(&failure.to_string());
    }

    if outcome.is_success() {
        ui::success(&format!("{} step(s) passed", outcome.steps_passed));
        Ok(())
    } else {
        bail!(
            "scenario failed after {} of {} step(s)",
            outcome.steps_passed,
            scenario.steps.len()
        )
    }
}
