//! `pipewright apply`

use anyhow::Result;
use declarative::{
    CancellationToken, Catalog, ExecuteOptions, ExecutionPlan, ExecutionReport, ProgressCallback,
    RemoteClient, RetryConfig, Snapshots, execute,
};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::StepProgress;
use crate::state::State;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let client = ctx.client()?;
    let catalog = gocdkit::catalog();
    let specs = super::load_specs(&args.plan.config, &catalog)?;
    let state_path = ctx.state_file()?;
    let mut state = State::load(&state_path)?;
    let snapshots = super::current_snapshots(&client, &state, args.plan.no_refresh)?;

    let plan = super::plan::build(&catalog, &specs, &snapshots, args.plan.target.as_deref())?;
    if !ctx.quiet {
        ui::header("Plan");
    }
    ui::display_plan(&plan.diffs(&catalog));

    if !plan.has_changes() {
        if !args.dry_run {
            // refreshed versions are still worth keeping
            state.replace(&snapshots);
            state.save(&state_path)?;
        }
        return Ok(());
    }

    if !args.yes && !args.dry_run && !super::confirm("Apply these changes?")? {
        ui::info("Apply cancelled");
        return Ok(());
    }

    let options = ExecuteOptions::new(args.dry_run).with_retry(RetryConfig {
        max_attempts: args.retries,
        ..RetryConfig::default()
    });
    let mut progress = StepProgress::new(ctx.quiet);
    let report = apply_plan(&plan, &client, &catalog, &snapshots, &options, &mut progress);

    if args.dry_run {
        ui::info("Dry run: no changes were made");
        return Ok(());
    }

    state.replace(&report.snapshots);
    state.save(&state_path)?;
    super::finish(&report, ctx.verbose)
}

/// Execute a plan with a fresh cancellation token
pub fn apply_plan(
    plan: &ExecutionPlan,
    client: &dyn RemoteClient,
    catalog: &Catalog,
    snapshots: &Snapshots,
    options: &ExecuteOptions,
    progress: &mut dyn ProgressCallback,
) -> ExecutionReport {
    let cancel = CancellationToken::new();
    log::info!("Applying {} step(s)", plan.len());
    execute(plan, client, catalog, snapshots, options, &cancel, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_resources;
    use declarative::memory::{Call, Fault};
    use declarative::{Error, MemoryClient, NoProgress, refresh};

    const RESOURCES: &str = r#"
[[resource]]
kind = "pipeline_template"
name = "template1"

[[resource.stages]]
name = "deploy"
jobs = []

[[resource]]
kind = "pipeline"
name = "pipeline0-terraform"
group = "testing"
template = "template1"

[[resource.materials]]
type = "git"
attributes = { url = "https://github.com/gocd/gocd" }
"#;

    fn apply_once(client: &MemoryClient, state: &mut State) -> ExecutionReport {
        let catalog = gocdkit::catalog();
        let specs = parse_resources(RESOURCES, &catalog).unwrap();
        let snapshots = refresh(client, &state.snapshots()).unwrap();
        let plan = super::super::plan::build(&catalog, &specs, &snapshots, None).unwrap();
        let options = ExecuteOptions::new(false).with_retry(RetryConfig::immediate(3));
        let report = apply_plan(&plan, client, &catalog, &snapshots, &options, &mut NoProgress);
        state.replace(&report.snapshots);
        report
    }

    #[test]
    fn test_apply_is_idempotent() {
        let client = MemoryClient::new();
        let mut state = State::default();

        let first = apply_once(&client, &mut state);
        assert!(first.is_success());
        assert_eq!(first.summary.created, 2);
        let keys: Vec<String> = state.resources.iter().map(|r| r.key().to_string()).collect();
        assert_eq!(keys, vec!["pipeline_template.template1", "pipeline.pipeline0-terraform"]);

        let mutations = client.mutation_count();
        let second = apply_once(&client, &mut state);
        assert_eq!(second.summary.unchanged, 2);
        assert_eq!(client.mutation_count(), mutations);
    }

    #[test]
    fn test_failed_template_skips_pipeline() {
        let client = MemoryClient::new();
        client.inject(
            Call::Create,
            Fault::Fail(Error::validation("pipeline_template", "template1", "bad stage")),
        );
        let mut state = State::default();

        let report = apply_once(&client, &mut state);
        assert!(!report.is_success());
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);
        assert!(state.is_empty());
        assert!(super::super::finish(&report, 0).is_err());
    }
}
