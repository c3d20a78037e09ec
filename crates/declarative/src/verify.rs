//! Destroy Verifier
//!
//! Confirms that resources a pass deleted are really gone.

use crate::client::RemoteClient;
use crate::error::{Error, Residue, Result};
use crate::types::{RemoteRecord, ResourceKey, Snapshots};
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Check that `kind`/`id` no longer exists.
///
/// A leftover resource fails with `ResourceNotDestroyed`; the residue tells
/// apart a resource that was never removed from one something else wrote.
pub fn verify_destroyed(
    client: &dyn RemoteClient,
    kind: &str,
    id: &str,
    last_known: Option<&RemoteRecord>,
) -> Result<()> {
    let Some(current) = client.fetch_optional(kind, id)? else {
        return Ok(());
    };

    let residue = match last_known {
        Some(previous) => {
            let fields = differing_fields(previous, &current);
            if fields.is_empty() {
                Residue::StillPresent
            } else {
                Residue::RemoteMutated { fields }
            }
        }
        None => Residue::StillPresent,
    };

    Err(Error::ResourceNotDestroyed {
        kind: kind.to_string(),
        id: id.to_string(),
        residue,
    })
}

/// Verify every key concurrently, returning each failure in key order.
pub fn verify_all(
    client: &dyn RemoteClient,
    keys: &[ResourceKey],
    last_known: &Snapshots,
) -> Vec<Error> {
    keys.par_iter()
        .filter_map(|key| verify_destroyed(client, &key.kind, &key.name, last_known.get(key)).err())
        .collect()
}

fn differing_fields(previous: &RemoteRecord, current: &RemoteRecord) -> Vec<String> {
    let names: BTreeSet<&String> = previous
        .attributes
        .keys()
        .chain(current.attributes.keys())
        .collect();
    names
        .into_iter()
        .filter(|name| previous.attributes.get(*name) != current.attributes.get(*name))
        .cloned()
        .collect()
}
