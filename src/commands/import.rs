//! `pipewright import`

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Catalog, ImportedResource, RemoteClient, resolve, resolve_all};

use crate::Context;
use crate::config;
use crate::state::State;
use crate::ui;

pub fn run(ctx: &Context, kind: &str, id: Option<&str>) -> Result<()> {
    let client = ctx.client()?;
    let catalog = gocdkit::catalog();
    let state_path = ctx.state_file()?;
    let mut state = State::load(&state_path)?;

    let result = match id {
        Some(id) => import(&client, &catalog, &mut state, kind, id).map(|i| vec![i]),
        None => import_untracked(&client, &catalog, &mut state, kind),
    };
    let imported = match result {
        Ok(imported) => imported,
        Err(e) => {
            if let Some(error) = e.downcast_ref::<declarative::Error>() {
                ui::dim(error.category().advice());
            }
            return Err(e);
        }
    };
    if imported.is_empty() {
        ui::info(&format!("No untracked {kind} resources on the server"));
        return Ok(());
    }
    state.save(&state_path)?;

    for resource in &imported {
        ui::success(&format!(
            "Imported {} at version {}",
            resource.spec.key(),
            resource.record.version
        ));
    }
    if !ctx.quiet {
        ui::dim("Add these blocks to your config to manage them:");
        println!();
    }
    for resource in &imported {
        print!("{}", config::render_resource(&resource.spec)?);
    }
    Ok(())
}

/// Resolve `kind`/`id` on the server and record it in state
pub fn import(
    client: &dyn RemoteClient,
    catalog: &Catalog,
    state: &mut State,
    kind: &str,
    id: &str,
) -> Result<ImportedResource> {
    let imported =
        resolve(client, catalog, kind, id).with_context(|| format!("Failed to import {kind}.{id}"))?;
    state.upsert(imported.record.clone());
    Ok(imported)
}

/// Import every listed resource of `kind` that state does not track yet
pub fn import_untracked(
    client: &dyn RemoteClient,
    catalog: &Catalog,
    state: &mut State,
    kind: &str,
) -> Result<Vec<ImportedResource>> {
    let listed = resolve_all(client, catalog, kind)
        .with_context(|| format!("Failed to list {kind} resources"))?;
    let untracked: Vec<ImportedResource> = listed
        .into_iter()
        .filter(|i| state.get(i.spec.key()).is_none())
        .collect();
    for imported in &untracked {
        state.upsert(imported.record.clone());
    }
    log::debug!("{} untracked {kind} resource(s) imported", untracked.len());
    Ok(untracked)
}
