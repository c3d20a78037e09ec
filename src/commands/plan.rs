//! `pipewright plan`

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Catalog, ExecutionPlan, ResourceSpec, Snapshots};

use crate::Context;
use crate::cli::PlanArgs;
use crate::state::State;
use crate::ui;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let client = ctx.client()?;
    let catalog = gocdkit::catalog();
    let specs = super::load_specs(&args.config, &catalog)?;
    let state = State::load(&ctx.state_file()?)?;
    let snapshots = super::current_snapshots(&client, &state, args.no_refresh)?;

    let plan = build(&catalog, &specs, &snapshots, args.target.as_deref())?;
    if !ctx.quiet {
        ui::header("Plan");
    }
    ui::display_plan(&plan.diffs(&catalog));
    Ok(())
}

/// Plan the declared specs, narrowed to `target` if given
pub fn build(
    catalog: &Catalog,
    specs: &[ResourceSpec],
    snapshots: &Snapshots,
    target: Option<&str>,
) -> Result<ExecutionPlan> {
    let plan = declarative::plan(catalog, specs, snapshots).context("Planning failed")?;
    Ok(plan.filter_by_target(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_resources;
    use declarative::{Action, Error};

    const CYCLE: &str = r#"
[[resource]]
kind = "pipeline_template"
name = "a"
stages = []
depends_on = ["pipeline_template.b"]

[[resource]]
kind = "pipeline_template"
name = "b"
stages = []
depends_on = ["pipeline_template.a"]
"#;

    #[test]
    fn test_cycle_is_reported_with_context() {
        let catalog = gocdkit::catalog();
        let specs = parse_resources(CYCLE, &catalog).unwrap();
        let err = build(&catalog, &specs, &Snapshots::new(), None).unwrap_err();

        assert!(err.to_string().contains("Planning failed"));
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_target_narrows_plan() {
        let catalog = gocdkit::catalog();
        let specs = parse_resources(
            "[[resource]]\nkind = \"pipeline_template\"\nname = \"a\"\nstages = []\n\n\
             [[resource]]\nkind = \"pipeline_template\"\nname = \"b\"\nstages = []\n",
            &catalog,
        )
        .unwrap();

        let plan = build(&catalog, &specs, &Snapshots::new(), Some("pipeline_template.b")).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].operation.action(), Action::Create);
        assert_eq!(plan.steps[0].key().name, "b");
    }
}
