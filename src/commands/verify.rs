//! `pipewright verify-destroyed`

use anyhow::Result;
use declarative::{ResourceKey, verify_destroyed};

use crate::Context;
use crate::state::State;
use crate::ui;

pub fn run(ctx: &Context, kind: &str, id: &str) -> Result<()> {
    let client = ctx.client()?;
    let state = State::load(&ctx.state_file()?)?;
    let key = ResourceKey::new(kind, id);

    // compare against the last record seen, if state still has one
    match verify_destroyed(&client, kind, id, state.get(&key)) {
        Ok(()) => {
            ui::success(&format!("{key} does not exist"));
            Ok(())
        }
        Err(error) => {
            ui::dim(error.category().advice());
            Err(error.into())
        }
    }
}
