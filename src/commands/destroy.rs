//! `pipewright destroy`

use anyhow::{Result, bail};
use declarative::{
    Catalog, Error, ExecuteOptions, ExecutionReport, ProgressCallback, RemoteClient, ResourceKey,
    Snapshots, plan_destroy, verify_all,
};

use crate::Context;
use crate::cli::DestroyArgs;
use crate::progress::StepProgress;
use crate::state::State;
use crate::ui;

pub fn run(ctx: &Context, args: &DestroyArgs) -> Result<()> {
    let client = ctx.client()?;
    let catalog = gocdkit::catalog();
    let state_path = ctx.state_file()?;
    let mut state = State::load(&state_path)?;

    if state.is_empty() {
        ui::info("Nothing to destroy: state is empty");
        return Ok(());
    }

    let snapshots = super::current_snapshots(&client, &state, false)?;
    let plan = plan_destroy(&catalog, &snapshots)?.filter_by_target(args.target.as_deref());
    if !ctx.quiet {
        ui::header("Destroy");
    }
    ui::display_plan(&plan.diffs(&catalog));

    if plan.is_empty() {
        state.replace(&snapshots);
        state.save(&state_path)?;
        return Ok(());
    }

    if !args.yes && !super::confirm("Delete these resources?")? {
        ui::info("Destroy cancelled");
        return Ok(());
    }

    let mut progress = StepProgress::new(ctx.quiet);
    let (report, leftovers) =
        destroy(&client, &catalog, &snapshots, args.target.as_deref(), &mut progress)?;

    state.replace(&report.snapshots);
    state.save(&state_path)?;

    super::finish(&report, ctx.verbose)?;
    if !leftovers.is_empty() {
        for error in &leftovers {
            ui::error(&error.to_string());
        }
        bail!("{} resource(s) still present after destroy", leftovers.len());
    }
    ui::success("Verified every deleted resource is gone");
    Ok(())
}

/// Delete the (targeted) snapshots, then check the server no longer
/// reports any resource whose delete succeeded
pub fn destroy(
    client: &dyn RemoteClient,
    catalog: &Catalog,
    snapshots: &Snapshots,
    target: Option<&str>,
    progress: &mut dyn ProgressCallback,
) -> Result<(ExecutionReport, Vec<Error>)> {
    let plan = plan_destroy(catalog, snapshots)?.filter_by_target(target);
    let report =
        super::apply::apply_plan(&plan, client, catalog, snapshots, &ExecuteOptions::default(), progress);

    let deleted: Vec<ResourceKey> = report
        .outcomes
        .iter()
        .filter(|o| o.result.is_success())
        .map(|o| o.key.clone())
        .collect();
    let leftovers = verify_all(client, &deleted, snapshots);
    Ok((report, leftovers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Attributes, MemoryClient, NoProgress, RemoteRecord, Residue};

    fn seed(client: &MemoryClient, snapshots: &mut Snapshots, kind: &str, id: &str) {
        let mut attributes = Attributes::new();
        attributes.insert("group".into(), "testing".into());
        let record = client.seed(RemoteRecord {
            kind: kind.into(),
            id: id.into(),
            version: String::new(),
            attributes,
        });
        snapshots.insert(record.key(), record);
    }

    #[test]
    fn test_destroy_then_verify() {
        let client = MemoryClient::new();
        let mut snapshots = Snapshots::new();
        seed(&client, &mut snapshots, "pipeline_template", "template1");
        seed(&client, &mut snapshots, "pipeline", "pipeline0-terraform");

        let (report, leftovers) =
            destroy(&client, &gocdkit::catalog(), &snapshots, None, &mut NoProgress).unwrap();

        assert!(report.is_success());
        assert_eq!(report.summary.deleted, 2);
        assert!(report.snapshots.is_empty());
        assert!(leftovers.is_empty());
        assert!(client.is_empty());
    }

    #[test]
    fn test_imported_out_of_order_deletes_pipeline_before_template() {
        let client = MemoryClient::new();
        let mut snapshots = Snapshots::new();
        let mut attributes = Attributes::new();
        attributes.insert("group".into(), "testing".into());
        attributes.insert("template".into(), "template1".into());
        let pipeline = client.seed(RemoteRecord {
            kind: "pipeline".into(),
            id: "pipeline0-terraform".into(),
            version: String::new(),
            attributes,
        });
        snapshots.insert(pipeline.key(), pipeline);
        seed(&client, &mut snapshots, "pipeline_template", "template1");

        let (report, leftovers) =
            destroy(&client, &gocdkit::catalog(), &snapshots, None, &mut NoProgress).unwrap();

        let order: Vec<String> = report.outcomes.iter().map(|o| o.key.to_string()).collect();
        assert_eq!(
            order,
            vec!["pipeline.pipeline0-terraform", "pipeline_template.template1"]
        );
        assert!(leftovers.is_empty());
        assert!(client.is_empty());
    }

    #[test]
    fn test_targeted_destroy_keeps_the_rest() {
        let client = MemoryClient::new();
        let mut snapshots = Snapshots::new();
        seed(&client, &mut snapshots, "pipeline_template", "template1");
        seed(&client, &mut snapshots, "pipeline", "pipeline0-terraform");

        let (report, leftovers) = destroy(
            &client,
            &gocdkit::catalog(),
            &snapshots,
            Some("pipeline"),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(report.summary.deleted, 1);
        assert!(leftovers.is_empty());
        assert_eq!(report.snapshots.len(), 1);
        assert!(client.get("pipeline_template", "template1").is_some());
    }

    #[test]
    fn test_recreated_resource_is_reported() {
        let client = MemoryClient::new();
        let mut snapshots = Snapshots::new();
        seed(&client, &mut snapshots, "pipeline", "p1");

        let key = ResourceKey::new("pipeline", "p1");
        let prior = snapshots[&key].clone();
        let (_, leftovers) = {
            struct Recreate<'a>(&'a MemoryClient, RemoteRecord);
            impl ProgressCallback for Recreate<'_> {
                fn on_pass_start(&mut self, _count: usize) {}
                fn on_step_start(&mut self, _key: &ResourceKey, _action: declarative::Action) {}
                fn on_step_complete(
                    &mut self,
                    _key: &ResourceKey,
                    _result: &declarative::ExecutionResult,
                ) {
                    // another writer puts it back straight away
                    self.0.seed(self.1.clone());
                }
                fn on_pass_complete(&mut self, _summary: &declarative::ExecuteSummary) {}
            }
            let mut progress = Recreate(&client, prior);
            destroy(&client, &gocdkit::catalog(), &snapshots, None, &mut progress).unwrap()
        };

        assert_eq!(leftovers.len(), 1);
        assert!(matches!(
            &leftovers[0],
            Error::ResourceNotDestroyed {
                residue: Residue::StillPresent,
                ..
            }
        ));
    }
}
